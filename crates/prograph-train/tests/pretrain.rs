use candle_core::Device;
use prograph_core::SyntheticGraphs;
use prograph_nn::GnnType;
use prograph_prompt::PromptKind;
use prograph_train::{Error, GraphTask, PretrainConfig, SimGrace, TaskConfig};

fn pretrain_config(dir: &std::path::Path) -> PretrainConfig {
    PretrainConfig::new("synthetic")
        .with_gnn_type(GnnType::Gin)
        .with_hid_dim(8)
        .with_epochs(3)
        .with_checkpoint_dir(dir)
}

#[test]
fn pretraining_writes_the_best_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let graphs = SyntheticGraphs::default().with_num_graphs(20).generate().unwrap();
    let mut engine = SimGrace::new(pretrain_config(dir.path()), 4, &Device::Cpu).unwrap();
    let report = engine.pretrain(&graphs).unwrap();

    assert_eq!(report.epoch_losses.len(), 3);
    assert!(report.epoch_losses.iter().all(|l| l.is_finite()));
    assert_eq!(report.saved_epochs.first(), Some(&1));
    assert!(report.checkpoint_path.is_file());
    assert!(report
        .checkpoint_path
        .ends_with("synthetic.SimGRACE.GIN.8hidden_dim.safetensors"));
    let best = report.epoch_losses.iter().copied().fold(f64::INFINITY, f64::min);
    assert_eq!(report.best_loss, best);
}

#[test]
fn degenerate_batching_fails_before_training() {
    let dir = tempfile::tempdir().unwrap();
    let graphs = SyntheticGraphs::default().with_num_graphs(11).generate().unwrap();
    let mut engine = SimGrace::new(pretrain_config(dir.path()), 4, &Device::Cpu).unwrap();
    let err = engine.pretrain(&graphs).unwrap_err();
    assert!(matches!(err, Error::DegenerateBatch { len: 11, batch_size: 10 }));
    assert!(!pretrain_config(dir.path()).checkpoint_path().exists());
}

#[test]
fn downstream_task_starts_from_pretrained_backbone() {
    let dir = tempfile::tempdir().unwrap();
    let data = SyntheticGraphs::default().task_data().unwrap();
    let config = pretrain_config(dir.path());
    let mut engine = SimGrace::new(config, data.input_dim, &Device::Cpu).unwrap();
    let path = engine.pretrain(&data.all_graphs()).unwrap().checkpoint_path;

    let config = TaskConfig::new("synthetic")
        .with_gnn_type(GnnType::Gin)
        .with_hid_dim(8)
        .with_epochs(3)
        .with_prompt_type(PromptKind::Gprompt)
        .with_pre_train_model_path(&path);
    let mut task = GraphTask::new(config, data.clone(), &Device::Cpu).unwrap();
    task.run().unwrap();

    let wrong_gnn = TaskConfig::new("synthetic")
        .with_gnn_type(GnnType::Gcn)
        .with_hid_dim(8)
        .with_pre_train_model_path(&path);
    assert!(matches!(
        GraphTask::new(wrong_gnn, data.clone(), &Device::Cpu),
        Err(Error::Nn(prograph_nn::Error::CheckpointMismatch(_)))
    ));

    let wrong_dataset = TaskConfig::new("MUTAG")
        .with_gnn_type(GnnType::Gin)
        .with_hid_dim(8)
        .with_pre_train_model_path(&path);
    assert!(matches!(
        GraphTask::new(wrong_dataset, data.clone(), &Device::Cpu),
        Err(Error::Nn(prograph_nn::Error::CheckpointMismatch(_)))
    ));

    let wrong_width = TaskConfig::new("synthetic")
        .with_gnn_type(GnnType::Gin)
        .with_hid_dim(16)
        .with_pre_train_model_path(&path);
    assert!(GraphTask::new(wrong_width, data, &Device::Cpu).is_err());
}
