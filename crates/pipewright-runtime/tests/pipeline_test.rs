//! Integration tests for Pipeline: dataflow between stages, resumption, and
//! validation.

mod common;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use common::MockWorker;
use pipewright_runtime::{
  Checkpointer, CommandOutput, Executable, Input, Pipeline, RuntimeError, Stage, Worker,
};

/// split::part prints two paths, score::w reads the second, and reduce::sum
/// reads score's sidecar plus the first split file.
fn three_stages(worker: Arc<dyn Worker>) -> Vec<Stage> {
  let split = Stage::new(
    "split",
    worker.clone(),
    vec![Executable::files("part", Input::file("tasks/split.sh"), vec![]).with_interpreter("sh")],
  );
  let part = split.output(0).unwrap().clone();

  let score = Stage::new(
    "score",
    worker.clone(),
    vec![Executable::stdout(
      "w",
      Input::file("tasks/score.sh"),
      vec![part.file(1)],
    )],
  );
  let w = score.output(0).unwrap().clone();

  let reduce = Stage::new(
    "reduce",
    worker,
    vec![Executable::stdout(
      "sum",
      Input::file("tasks/reduce.sh"),
      vec![w.file(0), part.file(0)],
    )],
  );

  vec![split, score, reduce]
}

fn scripted_worker() -> Arc<MockWorker> {
  let worker = MockWorker::new();
  worker.respond("split.sh", "/work/a.txt\n/work/b.txt\n");
  worker.respond("score.sh", "7\n");
  worker.respond("reduce.sh", "total 7\n");
  worker
}

fn reorder(mut stages: Vec<Stage>, order: [usize; 3]) -> Vec<Stage> {
  let mut slots: Vec<Option<Stage>> = stages.drain(..).map(Some).collect();
  order.iter().filter_map(|&i| slots[i].take()).collect()
}

#[tokio::test]
async fn test_downstream_receives_upstream_file() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let config = common::config(temp_dir.path());
  let worker = scripted_worker();

  let pipeline = Pipeline::with_config(
    "flow",
    common::checkpointer(temp_dir.path()),
    three_stages(worker.clone()),
    config.clone(),
  )
  .expect("valid pipeline");
  let report = pipeline.run().await.expect("pipeline failed");

  let downloaded: Vec<PathBuf> = worker.downloads().into_iter().map(|(_, l)| l).collect();
  let b = config.output_dir.join("split::part").join("b.txt");
  assert_eq!(downloaded[1], b);

  let uploads = worker.uploads();
  assert!(uploads.contains(&(b.clone(), "input/b.txt".to_string())));
  assert!(
    worker
      .executes()
      .contains(&"chmod +x input/score.sh && input/score.sh input/b.txt".to_string())
  );

  let stage_names: Vec<&str> = report.stages.iter().map(|s| s.stage.as_str()).collect();
  assert_eq!(stage_names, vec!["split", "score", "reduce"]);
  let mut executed: Vec<&str> = report.executed().collect();
  executed.sort();
  assert_eq!(executed, vec!["reduce::sum", "score::w", "split::part"]);
}

#[tokio::test]
async fn test_consumers_wait_for_checkpoint_in_any_stage_order() {
  let orders = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
  ];

  for order in orders {
    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let outputs = temp_dir.path().join("outputs");
    let records = temp_dir.path().join("checkpoints").join("perm");

    // For every upload of an upstream file, record whether the producer's
    // checkpoint already existed at that moment.
    let observed = Arc::new(Mutex::new(Vec::new()));
    let worker = scripted_worker();
    {
      let observed = observed.clone();
      let outputs = outputs.clone();
      let records = records.clone();
      worker.on_upload(move |local: &Path| {
        let record = if local.starts_with(&outputs) {
          local
            .parent()
            .and_then(Path::file_name)
            .map(|producer| records.join(producer))
        } else if local.starts_with(&records) {
          Some(local.with_extension(""))
        } else {
          None
        };
        if let Some(record) = record {
          observed.lock().unwrap().push(record.exists());
        }
      });
    }

    let stages = reorder(three_stages(worker.clone()), order);
    let pipeline = Pipeline::with_config(
      "perm",
      common::checkpointer(temp_dir.path()),
      stages,
      common::config(temp_dir.path()),
    )
    .expect("valid pipeline");
    pipeline.run().await.expect("pipeline failed");

    let observed = observed.lock().unwrap().clone();
    // score uploads b.txt; reduce uploads score's sidecar and a.txt.
    assert_eq!(observed.len(), 3, "order {:?}", order);
    assert!(observed.iter().all(|&ok| ok), "order {:?}", order);
    assert_eq!(worker.executes().len(), 3, "order {:?}", order);
  }
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let config = common::config(temp_dir.path());

  let first_worker = scripted_worker();
  let first = Pipeline::with_config(
    "resume",
    common::checkpointer(temp_dir.path()),
    three_stages(first_worker.clone()),
    config.clone(),
  )
  .expect("valid pipeline");
  first.run().await.expect("first run failed");
  let mut first_paths = Vec::new();
  for stage in first.stages() {
    first_paths.push(stage.output(0).unwrap().paths().await.unwrap());
  }

  let second_worker = MockWorker::new();
  let second = Pipeline::with_config(
    "resume",
    common::checkpointer(temp_dir.path()),
    three_stages(second_worker.clone()),
    config,
  )
  .expect("valid pipeline");
  let report = second.run().await.expect("second run failed");

  assert!(second_worker.calls().is_empty());
  assert_eq!(report.executed().count(), 0);
  assert_eq!(report.restored().count(), 3);
  for (stage, expected) in second.stages().iter().zip(first_paths) {
    assert_eq!(stage.output(0).unwrap().paths().await.unwrap(), expected);
  }
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");

  let first_worker = scripted_worker();
  Pipeline::with_config(
    "one",
    common::checkpointer(temp_dir.path()),
    three_stages(first_worker),
    common::config(temp_dir.path()),
  )
  .expect("valid pipeline")
  .run()
  .await
  .expect("first run failed");

  let second_worker = scripted_worker();
  let report = Pipeline::with_config(
    "two",
    common::checkpointer(temp_dir.path()),
    three_stages(second_worker.clone()),
    common::config(temp_dir.path()),
  )
  .expect("valid pipeline")
  .run()
  .await
  .expect("second run failed");

  assert_eq!(report.executed().count(), 3);
  assert_eq!(second_worker.executes().len(), 3);
}

#[tokio::test]
async fn test_rejected_output_fails_consumers_without_running_them() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let checkpointer = common::checkpointer(temp_dir.path());

  let worker = MockWorker::new();
  worker.respond_with(
    "split.sh",
    CommandOutput {
      stdout: String::new(),
      stderr: "boom".to_string(),
      exit_code: Some(2),
    },
  );

  let pipeline = Pipeline::with_config(
    "reject",
    checkpointer.clone(),
    three_stages(worker.clone()),
    common::config(temp_dir.path()),
  )
  .expect("valid pipeline");
  let err = pipeline.run().await.unwrap_err();

  assert!(matches!(
    err,
    RuntimeError::Execution { ref qualified_name, .. } if qualified_name == "split::part"
  ));

  assert_eq!(worker.executes().len(), 1);
  for name in ["split::part", "score::w", "reduce::sum"] {
    assert!(!checkpointer.exists(name).await.unwrap(), "{}", name);
  }

  let score = pipeline.stage("score").unwrap().output(0).unwrap();
  let rejected = score.paths().await.unwrap_err();
  assert_eq!(rejected.producer, "score::w");
  assert!(rejected.message.contains("split::part"));
}

#[tokio::test]
async fn test_failed_stage_keeps_independent_checkpoints() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let config = common::config(temp_dir.path());

  let stages = |worker: Arc<MockWorker>| {
    vec![
      Stage::new(
        "left",
        worker.clone(),
        vec![Executable::stdout("ok", Input::file("left.sh"), vec![])],
      ),
      Stage::new(
        "right",
        worker,
        vec![Executable::stdout("flaky", Input::file("right.sh"), vec![])],
      ),
    ]
  };

  let first_worker = MockWorker::new();
  first_worker.fail_execute("right.sh", "worker lost");
  let first = Pipeline::with_config(
    "partial",
    common::checkpointer(temp_dir.path()),
    stages(first_worker),
    config.clone(),
  )
  .expect("valid pipeline");
  assert!(first.run().await.is_err());

  let second_worker = MockWorker::new();
  let second = Pipeline::with_config(
    "partial",
    common::checkpointer(temp_dir.path()),
    stages(second_worker.clone()),
    config,
  )
  .expect("valid pipeline");
  let report = second.run().await.expect("retry failed");

  assert_eq!(report.executed().collect::<Vec<_>>(), vec!["right::flaky"]);
  assert_eq!(report.restored().collect::<Vec<_>>(), vec!["left::ok"]);
  assert_eq!(
    second_worker.executes(),
    vec!["chmod +x input/right.sh && input/right.sh".to_string()]
  );
}

#[tokio::test]
async fn test_missing_output_item_is_reported() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let worker = MockWorker::new();
  worker.respond("split.sh", "/work/only.txt\n");

  let split = Stage::new(
    "split",
    worker.clone(),
    vec![Executable::files("part", Input::file("split.sh"), vec![])],
  );
  let part = split.output(0).unwrap().clone();
  let consume = Stage::new(
    "consume",
    worker.clone(),
    vec![Executable::stdout("c", Input::file("c.sh"), vec![part.file(3)])],
  );

  let err = Pipeline::with_config(
    "missing",
    common::checkpointer(temp_dir.path()),
    vec![split, consume],
    common::config(temp_dir.path()),
  )
  .expect("valid pipeline")
  .run()
  .await
  .unwrap_err();

  assert!(matches!(
    err,
    RuntimeError::MissingOutput { ref producer, item: 3, len: 1 } if producer == "split::part"
  ));
}

#[test]
fn test_duplicate_qualified_names_are_rejected() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let worker = MockWorker::new();

  let stages = vec![
    Stage::new(
      "s",
      worker.clone(),
      vec![Executable::stdout("a", Input::file("a.sh"), vec![])],
    ),
    Stage::new(
      "s",
      worker,
      vec![Executable::stdout("a", Input::file("b.sh"), vec![])],
    ),
  ];

  let err = Pipeline::new("dup", common::checkpointer(temp_dir.path()), stages).unwrap_err();
  assert!(matches!(err, RuntimeError::Configuration { ref message } if message.contains("s::a")));
}

#[test]
fn test_output_from_outside_pipeline_is_rejected() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let worker = MockWorker::new();

  let elsewhere = Stage::new(
    "elsewhere",
    worker.clone(),
    vec![Executable::stdout("p", Input::file("p.sh"), vec![])],
  );
  let consumer = Stage::new(
    "consumer",
    worker,
    vec![Executable::stdout(
      "c",
      Input::file("c.sh"),
      vec![elsewhere.output(0).unwrap().file(0)],
    )],
  );

  let err =
    Pipeline::new("dangling", common::checkpointer(temp_dir.path()), vec![consumer]).unwrap_err();
  assert!(
    matches!(err, RuntimeError::Configuration { ref message } if message.contains("elsewhere::p"))
  );
}

#[test]
fn test_graph_reflects_output_references() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let pipeline = Pipeline::new(
    "graph",
    common::checkpointer(temp_dir.path()),
    three_stages(MockWorker::new()),
  )
  .expect("valid pipeline");

  let graph = pipeline.graph().expect("graph");
  assert_eq!(graph.entry_points(), vec!["split::part"]);
  assert_eq!(
    graph.topological_order().unwrap(),
    vec!["split::part", "score::w", "reduce::sum"]
  );
  assert_eq!(pipeline.stage("score").unwrap().name(), "score");
  assert!(pipeline.stage("nope").is_none());
}

#[tokio::test]
async fn test_relative_output_dir_is_recorded_as_absolute() {
  let temp_dir = tempfile::tempdir_in(".").expect("failed to create temp dir");
  let cwd = std::env::current_dir().unwrap();
  let relative = temp_dir
    .path()
    .strip_prefix(&cwd)
    .unwrap_or(temp_dir.path())
    .to_path_buf();

  let worker = MockWorker::new();
  worker.respond("split.sh", "/work/a.txt\n");
  let stage = Stage::new(
    "split",
    worker,
    vec![Executable::files("part", Input::file("split.sh"), vec![])],
  );

  let config = common::config(&relative);
  let checkpointer = common::checkpointer(temp_dir.path());
  let pipeline = Pipeline::with_config("abs", checkpointer.clone(), vec![stage], config)
    .expect("valid pipeline");
  assert!(pipeline.config().output_dir.is_absolute());

  pipeline.run().await.expect("pipeline failed");
  let recorded = checkpointer.read("split::part").await.unwrap();
  assert_eq!(
    recorded,
    vec![cwd.join(&relative).join("outputs/split::part/a.txt")]
  );
}
