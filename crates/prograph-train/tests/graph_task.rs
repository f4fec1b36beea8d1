use candle_core::{Device, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use prograph_core::{DataLoader, GraphBatch, JsonDatasetDir, SyntheticGraphs};
use prograph_nn::{AnsweringHead, Backbone, GnnType};
use prograph_prompt::PromptKind;
use prograph_train::tasker::NoPrompt;
use prograph_train::{Error, GraphTask, PromptConfig, PromptStrategy, TaskConfig};

fn weights(varmap: &VarMap) -> Vec<Vec<f32>> {
    let data = varmap.data().lock().unwrap();
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();
    names
        .into_iter()
        .map(|n| data[n].as_tensor().flatten_all().unwrap().to_vec1().unwrap())
        .collect()
}

fn values(vars: &[Var]) -> Vec<Vec<f32>> {
    vars.iter()
        .map(|v| v.as_tensor().flatten_all().unwrap().to_vec1().unwrap())
        .collect()
}

fn config(prompt: PromptKind) -> TaskConfig {
    TaskConfig::new("synthetic")
        .with_prompt_type(prompt)
        .with_hid_dim(16)
        .with_epochs(6)
        .with_prompt(PromptConfig::default().with_token_num_per_group(5))
}

#[test]
fn gpf_run_reports_accuracy_in_unit_interval() {
    let data = SyntheticGraphs::default()
        .with_num_graphs(20)
        .with_num_classes(2)
        .with_feature_dim(4)
        .task_data()
        .unwrap();
    let mut task = GraphTask::new(config(PromptKind::Gpf), data, &Device::Cpu).unwrap();
    let report = task.run().unwrap();

    assert_eq!(report.epochs.len(), 5);
    assert!((0.0..=1.0).contains(&report.final_test_acc));
    assert!((0.0..=1.0).contains(&report.best_val_acc));
    assert!(report.epochs.iter().all(|r| r.loss.is_finite()));
}

#[test]
fn every_trainable_prompt_runs_on_every_backbone() {
    let prompts = [
        PromptKind::None,
        PromptKind::ProG,
        PromptKind::Gpf,
        PromptKind::GpfPlus,
        PromptKind::Gprompt,
    ];
    for gnn in GnnType::ALL {
        for prompt in prompts {
            let data = SyntheticGraphs::default().task_data().unwrap();
            let config = config(prompt).with_gnn_type(gnn).with_epochs(2);
            let report = GraphTask::new(config, data, &Device::Cpu)
                .and_then(|mut task| task.run())
                .unwrap_or_else(|e| panic!("{gnn} / {prompt}: {e}"));
            assert_eq!(report.epochs.len(), 1);
        }
    }
}

#[test]
fn one_epoch_moves_every_trainable_variable() {
    let prompts = [
        PromptKind::None,
        PromptKind::ProG,
        PromptKind::Gpf,
        PromptKind::GpfPlus,
        PromptKind::Gprompt,
    ];
    for prompt in prompts {
        let data = SyntheticGraphs::default().task_data().unwrap();
        let train = data.train.clone();
        let mut task = GraphTask::new(config(prompt), data, &Device::Cpu).unwrap();
        let vars = task.strategy().trainable_vars(task.backbone(), task.head());
        assert!(!vars.is_empty(), "{prompt}");
        let before = values(&vars);

        let mut loader = DataLoader::new(&train, 16, &Device::Cpu).unwrap();
        let loss = task.train(&mut loader).unwrap();
        assert!(loss.is_finite(), "{prompt}");

        let after = values(&vars);
        for (i, (b, a)) in before.iter().zip(&after).enumerate() {
            assert_ne!(a, b, "{prompt}: trainable variable {i} did not move");
        }
    }
}

#[test]
fn gpf_losses_change_across_epochs() {
    let data = SyntheticGraphs::default().task_data().unwrap();
    let config = config(PromptKind::Gpf).with_epochs(8);
    let mut task = GraphTask::new(config, data, &Device::Cpu).unwrap();
    let report = task.run().unwrap();
    let losses: Vec<f64> = report.epochs.iter().map(|r| r.loss).collect();
    assert!(losses.windows(2).any(|w| w[0] != w[1]), "{losses:?}");
}

#[test]
fn prog_never_moves_the_backbone() {
    let data = SyntheticGraphs::default().task_data().unwrap();
    let mut task = GraphTask::new(config(PromptKind::ProG), data, &Device::Cpu).unwrap();
    let before = weights(task.backbone().varmap());
    task.run().unwrap();
    assert_eq!(weights(task.backbone().varmap()), before);
}

#[test]
fn gpf_leaves_the_backbone_frozen_but_trains_the_head() {
    let data = SyntheticGraphs::default().task_data().unwrap();
    let mut task = GraphTask::new(config(PromptKind::Gpf), data, &Device::Cpu).unwrap();
    let backbone = weights(task.backbone().varmap());
    let head = weights(task.head().varmap());
    task.run().unwrap();
    assert_eq!(weights(task.backbone().varmap()), backbone);
    assert_ne!(weights(task.head().varmap()), head);
}

#[test]
fn optimizer_group_decides_what_moves() {
    let device = Device::Cpu;
    let graphs = SyntheticGraphs::default().with_num_graphs(8).generate().unwrap();
    let batch = GraphBatch::collate(&graphs, &device).unwrap();
    let params = ParamsAdamW {
        lr: 0.005,
        weight_decay: 5e-4,
        ..Default::default()
    };

    // Backbone trainable, head frozen.
    let backbone = Backbone::new(GnnType::Gcn, 4, 8, 2, &device).unwrap();
    let head = AnsweringHead::new(8, 2, &device).unwrap();
    let (b0, h0) = (weights(backbone.varmap()), weights(head.varmap()));
    let mut optimizer = AdamW::new(backbone.vars(), params.clone()).unwrap();
    let loss = NoPrompt.train_step(&batch, &backbone, &head).unwrap();
    optimizer.backward_step(&loss).unwrap();
    assert_ne!(weights(backbone.varmap()), b0);
    assert_eq!(weights(head.varmap()), h0);

    // Head trainable, backbone frozen.
    let backbone = Backbone::new(GnnType::Gcn, 4, 8, 2, &device).unwrap();
    let head = AnsweringHead::new(8, 2, &device).unwrap();
    let (b0, h0) = (weights(backbone.varmap()), weights(head.varmap()));
    let mut optimizer = AdamW::new(head.vars(), params).unwrap();
    let loss = NoPrompt.train_step(&batch, &backbone, &head).unwrap();
    optimizer.backward_step(&loss).unwrap();
    assert_eq!(weights(backbone.varmap()), b0);
    assert_ne!(weights(head.varmap()), h0);
}

#[test]
fn tasks_load_from_a_json_directory_with_shots() {
    let dir = tempfile::tempdir().unwrap();
    SyntheticGraphs::default()
        .task_data()
        .unwrap()
        .save(dir.path().join("toy.json"))
        .unwrap();

    let source = JsonDatasetDir::new(dir.path());
    let task = GraphTask::from_source(
        TaskConfig::new("toy").with_hid_dim(8).with_shot_num(Some(2)),
        &source,
        &Device::Cpu,
    )
    .unwrap();
    assert_eq!(task.config().dataset_name, "toy");

    let missing = GraphTask::from_source(TaskConfig::new("nope"), &source, &Device::Cpu);
    assert!(matches!(missing, Err(Error::Data(_))));
}
