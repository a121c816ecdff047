//! Provider adapters
//!
//! One [`http::ProviderCodec`] per wire format, all driven by the generic [`HttpEngine`].
//! [`EngineFactory`] picks the codec from [`ProviderSettings`].

pub mod claude;
pub mod factory;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod openai_responses;
pub mod settings;

pub use claude::{ClaudeCodec, ClaudeEngine};
pub use factory::EngineFactory;
pub use gemini::{GeminiCodec, GeminiEngine};
pub use http::{HttpEngine, ProviderCodec, ProviderOutput, SseEvent, decode_event_stream};
pub use openai::{OpenAiChatCodec, OpenAiEngine};
pub use openai_responses::{OpenAiResponsesCodec, OpenAiResponsesEngine};
pub use settings::{ApiType, ClaudeSettings, ProviderSettings};
