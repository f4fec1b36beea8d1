//! Pretraining and prompt tuning for graph neural networks.
//!
//! Two phases share one [`prograph_nn::Backbone`]:
//!
//! 1. **Pretraining** ([`pretrain`]): SimGRACE contrasts each graph's
//!    embedding against the embedding produced by a randomly perturbed copy
//!    of the backbone weights. No labels are used. Improving epochs are
//!    checkpointed as safetensors.
//! 2. **Downstream tuning** ([`tasker`]): a [`GraphTask`] loads the
//!    (optionally pretrained) backbone, wraps it in one [`PromptStrategy`]
//!    and runs the epoch loop, keeping the test accuracy of the best
//!    validation epoch.
//!
//! | Prompt | Trains | Loss |
//! |---|---|---|
//! | `None` | backbone + head | cross entropy |
//! | `ProG` | prompt token graphs | cross entropy over prompt-graph similarity |
//! | `gpf`, `gpf-plus` | prompt + head | cross entropy |
//! | `Gprompt` | readout mask | [`prompt_tuning_loss`] against class centroids |
//! | `gppt` | (initialization only) | none |
//!
//! # Example
//!
//! ```rust,ignore
//! use prograph_core::SyntheticGraphs;
//! use prograph_prompt::PromptKind;
//! use prograph_train::{GraphTask, TaskConfig};
//! use candle_core::Device;
//!
//! let data = SyntheticGraphs::default().task_data()?;
//! let config = TaskConfig::new("synthetic")
//!     .with_prompt_type(PromptKind::Gpf)
//!     .with_epochs(20);
//! let report = GraphTask::new(config, data, &Device::Cpu)?.run()?;
//! println!("final test accuracy {:.4}", report.final_test_acc);
//! ```

pub mod error;
pub mod loss;
pub mod metrics;
pub mod pretrain;
pub mod tasker;

pub use error::{Error, Result};
pub use loss::{center_embedding, contrastive_loss, prompt_tuning_loss};
pub use metrics::{accuracy, macro_f1};
pub use pretrain::{CheckpointTracker, ParamSnapshot, PretrainConfig, PretrainReport, SimGrace};
pub use tasker::{
    EpochRecord, Evaluation, GraphTask, PromptConfig, PromptStrategy, RunReport, TaskConfig,
};
