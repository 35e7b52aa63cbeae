//! Phase detection, intent classification and dispatch.

pub mod detector;
pub mod intent;
pub mod prompts;
pub mod router;

pub use detector::{detect_phase, reconcile, Detection, SkillArtifacts};
pub use intent::{Intent, IntentClassifier};
pub use prompts::{AgentTask, DefaultPromptCatalog, PromptCatalog, PromptContext};
pub use router::{route, Action, DispatchOutcome, DispatchRequest, Router, SkillStatus};
