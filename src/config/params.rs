use std::{fmt::Display, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use super::KwArgs;
use crate::error::{Result, TrainErr};

/// Whether the engine runs inside a single process or spread across workers and servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Local,
    Distributed,
}

/// The store-side update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    #[serde(rename = "adagrad")]
    AdaGrad,
}

/// How the distributed job tracker assigns jobs to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchKind {
    RoundRobin,
    ByPart,
}

/// Every option the engine understands.
///
/// Can be deserialized from a JSON file and then refined with `key=value` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub task: String,
    pub loss: String,
    pub data_in: String,
    pub val_data: String,
    pub data_format: String,
    pub model_in: String,
    pub model_out: String,
    pub pred_out: String,
    pub max_num_epochs: usize,
    pub num_threads: usize,
    pub batch_size: usize,
    pub num_parts: usize,
    pub shuffle: bool,
    pub neg_sampling: f32,
    pub max_inflight: usize,
    pub num_workers: usize,
    pub num_servers: usize,
    pub optimizer: OptimizerKind,
    pub learning_rate: f32,
    pub l2: f32,
    pub min_count: f32,
    pub dispatch: DispatchKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task: "train".to_string(),
            loss: "logit".to_string(),
            data_in: String::new(),
            val_data: String::new(),
            data_format: "libsvm".to_string(),
            model_in: String::new(),
            model_out: String::new(),
            pred_out: String::new(),
            max_num_epochs: 20,
            num_threads: 2,
            batch_size: 100,
            num_parts: 100,
            shuffle: false,
            neg_sampling: 1.,
            max_inflight: 10,
            num_workers: 4,
            num_servers: 2,
            optimizer: OptimizerKind::AdaGrad,
            learning_rate: 0.1,
            l2: 0.,
            min_count: 0.,
            dispatch: DispatchKind::RoundRobin,
        }
    }
}

impl Config {
    /// Reads a `Config` from a JSON file, missing fields take their defaults.
    ///
    /// # Arguments
    /// * `path` - The path of the JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Assigns every recognised option in `kwargs`.
    ///
    /// # Arguments
    /// * `kwargs` - The `key=value` pairs to apply, later pairs win.
    ///
    /// # Returns
    /// The pairs that weren't recognised, or an `InvalidConfig` if a recognised
    /// option can't be parsed or the resulting configuration is inconsistent.
    pub fn init_allow_unknown(&mut self, kwargs: KwArgs) -> Result<KwArgs> {
        let mut remain = Vec::new();

        for (key, val) in kwargs {
            match key.as_str() {
                "task" => self.task = val,
                "loss" => self.loss = val,
                "data_in" => self.data_in = val,
                "val_data" => self.val_data = val,
                "data_format" => self.data_format = val,
                "model_in" => self.model_in = val,
                "model_out" => self.model_out = val,
                "pred_out" => self.pred_out = val,
                "max_num_epochs" => self.max_num_epochs = parse(&key, &val)?,
                "num_threads" => self.num_threads = parse(&key, &val)?,
                "batch_size" => self.batch_size = parse(&key, &val)?,
                "num_parts" => self.num_parts = parse(&key, &val)?,
                "shuffle" => self.shuffle = parse_flag(&key, &val)?,
                "neg_sampling" => self.neg_sampling = parse(&key, &val)?,
                "max_inflight" => self.max_inflight = parse(&key, &val)?,
                "num_workers" => self.num_workers = parse(&key, &val)?,
                "num_servers" => self.num_servers = parse(&key, &val)?,
                "optimizer" => self.optimizer = parse_enum(&key, &val)?,
                "learning_rate" => self.learning_rate = parse(&key, &val)?,
                "l2" => self.l2 = parse(&key, &val)?,
                "min_count" => self.min_count = parse(&key, &val)?,
                "dispatch" => self.dispatch = parse_enum(&key, &val)?,
                _ => remain.push((key, val)),
            }
        }

        self.validate()?;
        Ok(remain)
    }

    /// Any task mentioning `dist_` runs distributed.
    pub fn mode(&self) -> Mode {
        if self.task.contains("dist_") {
            Mode::Distributed
        } else {
            Mode::Local
        }
    }

    /// Whether the prediction phase was requested.
    pub fn wants_prediction(&self) -> bool {
        self.task.contains("predict")
    }

    /// Checks the options that can't be validated one at a time.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("num_threads", self.num_threads),
            ("batch_size", self.batch_size),
            ("num_parts", self.num_parts),
            ("max_inflight", self.max_inflight),
            ("num_workers", self.num_workers),
            ("num_servers", self.num_servers),
        ];

        if let Some((key, _)) = positive.iter().find(|(_, val)| *val == 0) {
            return Err(TrainErr::InvalidConfig(format!("{key} must be positive")));
        }

        if !(self.neg_sampling > 0. && self.neg_sampling <= 1.) {
            return Err(TrainErr::InvalidConfig(format!(
                "neg_sampling must be in (0, 1], got {}",
                self.neg_sampling
            )));
        }

        if self.wants_prediction() && self.model_in.is_empty() {
            return Err(TrainErr::InvalidConfig(
                "a predict task requires model_in".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse<T>(key: &str, val: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    val.parse()
        .map_err(|e| TrainErr::InvalidConfig(format!("{key}={val}: {e}")))
}

fn parse_flag(key: &str, val: &str) -> Result<bool> {
    match val {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(TrainErr::InvalidConfig(format!(
            "{key}={val}: expected a boolean"
        ))),
    }
}

fn parse_enum<T>(key: &str, val: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(serde_json::Value::String(val.to_string()))
        .map_err(|e| TrainErr::InvalidConfig(format!("{key}={val}: {e}")))
}
