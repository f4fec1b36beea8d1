//! Downstream prompt tuning.

mod config;
mod graph_task;
mod strategy;
mod variants;

pub use config::{PromptConfig, TaskConfig};
pub use graph_task::{EpochRecord, GraphTask, RunReport};
pub use strategy::{acc_f1, build_strategy, collect_predictions, Evaluation, PromptStrategy};
pub use variants::{
    FeaturePrompt, GpfStrategy, GpptStrategy, GpromptStrategy, NoPrompt, ProgStrategy,
};
