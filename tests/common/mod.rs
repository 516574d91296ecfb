#![allow(dead_code)]

use std::{
    env, fs,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use sparse_orchestra::{
    Config,
    config::{KwArgs, parse_kwargs},
};

/// A unique path under the temp dir.
pub fn tmp_path(name: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!("sparse_orchestra_{}_{n}_{name}", std::process::id()))
}

/// Writes `rows` linearly separable libsvm rows.
///
/// Every row has the bias feature 0, positives feature 1 and negatives feature 2.
pub fn write_dataset(name: &str, rows: usize) -> String {
    let content: String = (0..rows)
        .map(|i| {
            if i % 2 == 0 {
                "1 0:1 1:1\n".to_string()
            } else {
                "0 0:1 2:1\n".to_string()
            }
        })
        .collect();

    let path = tmp_path(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

pub fn kwargs(args: &[String]) -> KwArgs {
    parse_kwargs(args).unwrap()
}

pub fn config(args: &[String]) -> Config {
    let mut config = Config::default();
    let remain = config.init_allow_unknown(kwargs(args)).unwrap();
    assert!(remain.is_empty(), "unexpected options {remain:?}");
    config
}
