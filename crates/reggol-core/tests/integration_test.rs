//! Integration tests for reggol-core.

use std::fs;
use std::path::{Path, PathBuf};

use reggol_core::storage;
use reggol_core::{
    load_snapshot, GitInfoProvider, Logger, LoggerConfig, ParamValue, RepoInfo, ReggolError,
    SchemaPolicy, SnapshotFormat, SnapshotMode,
};
use tempfile::TempDir;

fn make_logger(tmp: &TempDir, prefix: &str) -> Logger {
    let config = LoggerConfig::new(prefix)
        .with_base_log_dir(tmp.path())
        .with_param("algorithm", "baseline")
        .with_param("batch_size", 5)
        .with_param("learning_rate", 0.02);
    Logger::setup(config).expect("Failed to set up Logger")
}

fn log_dir(logger: &Logger) -> PathBuf {
    logger.log_dir().expect("logger has a log dir").to_path_buf()
}

struct SingleRepo;

impl GitInfoProvider for SingleRepo {
    fn repo_infos(&self) -> Vec<reggol_core::Result<RepoInfo>> {
        vec![
            Ok(RepoInfo {
                directory: PathBuf::from("/work/project"),
                code_diff: "-old\n+new".to_string(),
                code_diff_staged: String::new(),
                commit_hash: "deadbeef".to_string(),
                branch_name: "[DETACHED]".to_string(),
            }),
            Err(ReggolError::GitUnavailable {
                directory: PathBuf::from("/work/vendored"),
                reason: "not a git repository".to_string(),
            }),
        ]
    }
}

#[test]
fn test_setup_creates_run_layout() {
    let tmp = TempDir::new().unwrap();
    let mut logger = make_logger(&tmp, "custom_experiment");
    let dir = log_dir(&logger);
    let exp_name = logger.exp_name().unwrap().to_string();

    assert_eq!(dir.parent().unwrap(), tmp.path().join("custom-experiment"));
    assert_eq!(dir.file_name().unwrap().to_str().unwrap(), exp_name);
    assert!(dir.join("debug.log").exists(), "debug.log should exist");
    assert!(dir.join("progress.csv").exists(), "progress.csv should exist");
    assert_eq!(logger.snapshot_dir(), Some(dir.as_path()));
    assert_eq!(logger.snapshot_mode(), SnapshotMode::GapAndLast);
    assert_eq!(logger.snapshot_gap(), 100);

    let variant = storage::load_variant(&dir.join("variant.json")).unwrap();
    assert_eq!(variant["exp_prefix"], ParamValue::from("custom_experiment"));
    assert_eq!(variant["exp_name"], ParamValue::from(exp_name.as_str()));
    assert_eq!(variant["batch_size"], ParamValue::Int(5));

    logger.close().unwrap();
    let debug_log = fs::read_to_string(dir.join("debug.log")).unwrap();
    assert!(debug_log.contains(&format!("log directory: {}", dir.display())));
    assert!(debug_log.contains("Variant:"));
    assert!(debug_log.contains("\"learning_rate\": 0.02"));
}

#[test]
fn test_iterations_write_progress_rows() {
    let tmp = TempDir::new().unwrap();
    let mut logger = make_logger(&tmp, "rows");
    let dir = log_dir(&logger);

    for i in 0..5i64 {
        logger.log(&format!("Started iteration {i}")).unwrap();
        logger.record_value("mse", 0.0001 * i as f64);
        logger.record_dict([("iteration", i), ("sample size", 10 * i)]);
        logger.record_value("training time", 0.25);
        assert!(logger.dump_tabular().unwrap());
        assert!(logger.table_dict().is_empty());
    }
    logger.close().unwrap();

    let data = storage::read_tabular(&dir.join("progress.csv"), b',').unwrap();
    assert_eq!(data.columns, ["mse", "iteration", "sample size", "training time"]);
    assert_eq!(data.rows.len(), 5);
    assert_eq!(data.rows[3][1..], ["3", "30", "0.25"]);
    assert_eq!(data.rows[3][0].parse::<f64>().unwrap(), 0.0001 * 3.0);

    let debug_log = fs::read_to_string(dir.join("debug.log")).unwrap();
    assert!(debug_log.contains("Started iteration 4"));
    assert!(debug_log.contains("sample size"));
}

#[test]
fn test_schema_change_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let mut logger = make_logger(&tmp, "schema");
    logger.record_dict([("a", 1), ("b", 2)]);
    logger.dump_tabular().unwrap();
    logger.record_dict([("a", 1), ("c", 3)]);
    assert!(matches!(
        logger.dump_tabular(),
        Err(ReggolError::SchemaMismatch { .. })
    ));
    assert_eq!(logger.tabular_schema().unwrap(), ["a", "b"]);
}

#[test]
fn test_fill_policy_and_delimiter_from_config() {
    let tmp = TempDir::new().unwrap();
    let config = LoggerConfig::new("fill")
        .with_base_log_dir(tmp.path())
        .with_schema_policy(SchemaPolicy::Fill)
        .with_tabular_delimiter(';');
    let mut logger = Logger::setup(config).unwrap();
    let dir = log_dir(&logger);

    logger.record_value("x", 1);
    logger.dump_tabular().unwrap();
    logger.dump_tabular().unwrap();
    logger.close().unwrap();

    let data = storage::read_tabular(&dir.join("progress.csv"), b';').unwrap();
    assert_eq!(data.columns, ["x"]);
    assert_eq!(data.rows, vec![vec!["1".to_string()], vec![String::new()]]);
}

#[test]
fn test_tabular_only_keeps_table_out_of_text_log() {
    let tmp = TempDir::new().unwrap();
    let config = LoggerConfig::new("quiet")
        .with_base_log_dir(tmp.path())
        .with_log_tabular_only(true);
    let mut logger = Logger::setup(config).unwrap();
    let dir = log_dir(&logger);
    assert!(logger.log_tabular_only());

    logger.record_value("episode_return", 12.5);
    logger.dump_tabular().unwrap();
    logger.close().unwrap();

    let debug_log = fs::read_to_string(dir.join("debug.log")).unwrap();
    assert!(!debug_log.contains("episode_return"));
    let progress = fs::read_to_string(dir.join("progress.csv")).unwrap();
    assert_eq!(progress, "episode_return\n12.5\n");
}

#[test]
fn test_snapshots_follow_configured_policy() {
    let tmp = TempDir::new().unwrap();
    let config = LoggerConfig::new("snap")
        .with_base_log_dir(tmp.path())
        .with_snapshot(SnapshotMode::GapAndLast, 2)
        .with_snapshot_format(SnapshotFormat::Json);
    let logger = Logger::setup(config).unwrap();
    let dir = log_dir(&logger);

    for itr in 0..5u64 {
        let params = ParamValue::map([("itr", ParamValue::from(itr)), ("w", vec![1.5; 3].into())]);
        logger.save_itr_params(itr, &params).unwrap();
    }
    assert_eq!(
        storage::list_snapshots(&dir).unwrap(),
        ["itr_0.json", "itr_2.json", "itr_4.json", "params.json"]
    );
    let last = load_snapshot(dir.join("params.json"), SnapshotFormat::Json).unwrap();
    assert_eq!(last, ParamValue::map([("itr", ParamValue::Int(4)), ("w", vec![1.5; 3].into())]));
}

#[test]
fn test_binary_round_trip() {
    let tmp = TempDir::new().unwrap();
    let logger = make_logger(&tmp, "binary");

    let nested = ParamValue::map([
        ("layers", ParamValue::from(vec![64, 64, 32])),
        ("name", ParamValue::from("mlp")),
        ("dropout", ParamValue::from(0.1)),
        ("frozen", ParamValue::from(false)),
        (
            "optimizer",
            ParamValue::map([
                ("kind", ParamValue::from("adam")),
                ("betas", vec![0.9, 0.999].into()),
                ("schedule", ParamValue::Null),
            ]),
        ),
    ]);
    let path = logger
        .save_extra_data(&nested, "policy.bin", SnapshotFormat::Binary)
        .unwrap();
    assert_eq!(load_snapshot(&path, SnapshotFormat::Binary).unwrap(), nested);
}

fn reward_shaping(x: f64) -> f64 {
    x * 0.5
}

#[test]
fn test_callables_degrade_to_parseable_json() {
    let tmp = TempDir::new().unwrap();
    let logger = make_logger(&tmp, "callables");

    let data = ParamValue::map([
        ("shaping", ParamValue::callable(&reward_shaping)),
        ("kind", ParamValue::type_of::<Logger>()),
        ("score", ParamValue::from(f64::NAN)),
    ]);
    let path = logger
        .save_extra_data(&data, "extra.json", SnapshotFormat::Json)
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(parsed["shaping"]["$function"]
        .as_str()
        .unwrap()
        .ends_with("reward_shaping"));
    assert_eq!(parsed["kind"]["$class"], "reggol_core::logger::Logger");
    assert_eq!(parsed["score"], "NaN");
}

#[test]
fn test_unsupported_format_string() {
    assert!(matches!(
        "joblib".parse::<SnapshotFormat>(),
        Err(ReggolError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_git_info_is_written_and_failures_skipped() {
    let tmp = TempDir::new().unwrap();
    let config = LoggerConfig::new("git").with_base_log_dir(tmp.path());
    let logger = Logger::setup_with_git(config, &SingleRepo).unwrap();
    let dir = log_dir(&logger);

    assert_eq!(
        fs::read_to_string(dir.join("work-project.patch")).unwrap(),
        "-old\n+new\n"
    );
    let infos = fs::read_to_string(dir.join("git_infos.txt")).unwrap();
    assert!(infos.contains("git hash: deadbeef"));
    assert!(infos.contains("git branch name: [DETACHED]"));
    assert!(!infos.contains("vendored"));
}

#[test]
fn test_reset_starts_an_independent_session() {
    let tmp = TempDir::new().unwrap();
    let mut logger = make_logger(&tmp, "first");
    let first_dir = log_dir(&logger);
    logger.record_dict([("a", 1), ("b", 2)]);
    logger.dump_tabular().unwrap();
    logger.record_value("leftover", 1);

    logger.reset().unwrap();
    assert!(logger.log_dir().is_none());
    assert!(logger.tabular_schema().is_none());
    assert!(logger.table_dict().is_empty());
    assert_eq!(logger.snapshot_dir(), None);

    let second = tmp.path().join("second");
    logger.add_text_output(second.join("debug.log")).unwrap();
    logger.add_tabular_output(second.join("progress.csv")).unwrap();
    logger.set_snapshot_dir(&second);
    logger.record_value("z", 9);
    logger.dump_tabular().unwrap();
    logger.close().unwrap();

    assert_eq!(fs::read_to_string(second.join("progress.csv")).unwrap(), "z\n9\n");
    assert_eq!(fs::read_to_string(first_dir.join("progress.csv")).unwrap(), "a,b\n1,2\n");
}

#[test]
fn test_two_sessions_side_by_side() {
    let tmp = TempDir::new().unwrap();
    let mut one = make_logger(&tmp, "one");
    let mut two = make_logger(&tmp, "two");
    one.record_value("loss", 1.0);
    two.record_value("reward", 2.0);
    one.dump_tabular().unwrap();
    two.dump_tabular().unwrap();

    let read = |logger: &Logger| {
        fs::read_to_string(logger.log_dir().unwrap().join("progress.csv")).unwrap()
    };
    assert_eq!(read(&one), "loss\n1.0\n");
    assert_eq!(read(&two), "reward\n2.0\n");
}

#[test]
fn test_second_session_keeps_existing_progress_header() {
    let tmp = TempDir::new().unwrap();
    let mut first = make_logger(&tmp, "shared");
    let shared = log_dir(&first).join("progress.csv");
    first.record_dict([("a", 1), ("b", 2)]);
    first.dump_tabular().unwrap();
    first.close().unwrap();

    let mut second = make_logger(&tmp, "shared_again");
    second.add_tabular_output(&shared).unwrap();
    assert_eq!(second.tabular_schema().unwrap(), ["a", "b"]);

    second.record_value("x", 9);
    assert!(matches!(
        second.dump_tabular(),
        Err(ReggolError::SchemaMismatch { .. })
    ));
    assert_eq!(fs::read_to_string(&shared).unwrap(), "a,b\n1,2\n");
}

#[test]
fn test_prefixes_through_facade() {
    let tmp = TempDir::new().unwrap();
    let mut logger = make_logger(&tmp, "prefixes");
    let dir = log_dir(&logger);

    logger.with_prefix("[epoch 1] ", |l| l.log("evaluating")).unwrap();
    logger.with_tabular_prefix("eval/", |l| l.record_value("return", 3));
    logger.record_misc_stat("Q", &[1.0, 3.0], reggol_core::Placement::Back);
    assert_eq!(
        logger.key_set(),
        ["eval/return", "AverageQ", "StdQ", "MedianQ", "MinQ", "MaxQ"]
    );
    logger.dump_tabular().unwrap();
    logger.close().unwrap();

    let debug_log = fs::read_to_string(dir.join("debug.log")).unwrap();
    assert!(debug_log.contains(" | [epoch 1] evaluating"));
    assert!(!debug_log.contains("[epoch 1] log directory"));
}

#[test]
fn test_unwritable_base_dir() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("occupied");
    fs::write(&file, "").unwrap();
    let config = LoggerConfig::new("blocked").with_base_log_dir(&file);
    assert!(matches!(
        Logger::setup(config),
        Err(ReggolError::FileAccess { .. })
    ));
    assert!(Path::new(&file).is_file());
}
