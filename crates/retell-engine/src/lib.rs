pub mod capture;
pub mod error;
pub mod gemini;
pub mod model;
pub mod pipeline;

pub use capture::{capture_inline_payload, InlinePayload};
pub use error::CoachError;
pub use gemini::GeminiCoach;
pub use model::{default_model, CoachModel, OfflineCoach};
pub use pipeline::{CoachPipeline, RunState, SessionRequest};
