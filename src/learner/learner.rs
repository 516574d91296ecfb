use std::{sync::Arc, time::Duration};

use log::{info, warn};
use parking_lot::Mutex;
use tokio::time;

use super::{Context, NullSink, PredictionSink, create_sink, pipeline};
use crate::{
    config::{Config, KwArgs, Mode},
    error::{Result, TrainErr},
    loss::{self, Progress},
    storage::{Store, StoreHandle, create_store},
    tracking::{Job, JobTracker, JobType, POLL_INTERVAL},
};

/// Invoked after every epoch with its training and validation progress.
pub type EpochCallback = Box<dyn Fn(usize, &Progress, &Progress) + Send + Sync>;

/// Invoked on every poll while a phase drains, with the phase's progress so far.
pub type ContCallback = Box<dyn Fn(&Progress) + Send + Sync>;

/// The training orchestrator.
///
/// Runs `LoadModel`, `Predict`, then `Train` and `Validate` once per epoch and
/// finally `SaveModel`, every phase fully drained before the next starts.
pub struct Learner {
    ctx: Arc<Context>,
    tracker: JobTracker,
    epoch_callbacks: Vec<EpochCallback>,
    cont_callbacks: Vec<ContCallback>,
    poll: Duration,
}

impl Learner {
    /// Creates a new `Learner` from `key=value` options.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `kwargs` - The options, applied over the defaults.
    ///
    /// # Returns
    /// An error if an option is invalid, or unrecognised in distributed mode.
    pub fn new(kwargs: KwArgs) -> Result<Self> {
        Self::with_config(Config::default(), kwargs)
    }

    /// Creates a new `Learner` applying `kwargs` over `config`.
    pub fn with_config(mut config: Config, kwargs: KwArgs) -> Result<Self> {
        let remain = config.init_allow_unknown(kwargs)?;
        let mode = config.mode();

        if mode == Mode::Distributed && !remain.is_empty() {
            let keys = remain.into_iter().map(|(key, _)| key).collect();
            return Err(TrainErr::UnknownOptions(keys));
        }

        for (key, val) in &remain {
            warn!("unrecognized option {key} = {val}");
        }

        let store = create_store(mode, &config);
        Self::with_store(config, store)
    }

    /// Creates a new `Learner` over an already built store.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `config` - The validated options.
    /// * `store` - The parameter store backend.
    ///
    /// # Returns
    /// An `InvalidConfig` if `config` is inconsistent.
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        config.validate()?;
        let mode = config.mode();
        let mut tracker = JobTracker::create(mode, config.num_workers, config.dispatch);

        let loss = loss::create(&config.loss, config.num_threads)?;
        let sink: Arc<dyn PredictionSink> = if config.wants_prediction() {
            create_sink(&config.pred_out)?
        } else {
            Arc::new(NullSink)
        };

        let ctx = Arc::new(Context {
            config,
            store: StoreHandle::new(store),
            loss,
            sink,
            progress: Mutex::new(Progress::default()),
        });

        let job_ctx = Arc::clone(&ctx);
        tracker.set_consumer(move |job| pipeline::process(Arc::clone(&job_ctx), job));

        info!(
            distributed = mode == Mode::Distributed,
            loss = ctx.config.loss.as_str();
            "learner ready"
        );

        Ok(Self {
            ctx,
            tracker,
            epoch_callbacks: Vec::new(),
            cont_callbacks: Vec::new(),
            poll: POLL_INTERVAL,
        })
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// The learner's parameter store.
    pub fn store(&self) -> &StoreHandle {
        &self.ctx.store
    }

    /// Registers a callback run after every epoch.
    pub fn add_epoch_callback<F>(&mut self, f: F)
    where
        F: Fn(usize, &Progress, &Progress) + Send + Sync + 'static,
    {
        self.epoch_callbacks.push(Box::new(f));
    }

    /// Registers a callback run on every poll while a phase drains.
    pub fn add_cont_callback<F>(&mut self, f: F)
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.cont_callbacks.push(Box::new(f));
    }

    /// Runs every configured phase to completion.
    ///
    /// # Returns
    /// The first error of the first failing phase, its jobs are still drained.
    pub async fn run_scheduler(&self) -> Result<()> {
        let cfg = &self.ctx.config;

        if !cfg.model_in.is_empty() {
            info!(path = cfg.model_in.as_str(); "loading model");
            self.run_model_job(JobType::LoadModel, &cfg.model_in).await?;
        }

        if cfg.wants_prediction() {
            self.run_epoch(0, JobType::Predict).await?;
            self.ctx.sink.flush()?;
        }

        for epoch in 0..cfg.max_num_epochs {
            let train = self.run_epoch(epoch, JobType::Train).await?;
            let val = self.run_epoch(epoch, JobType::Validate).await?;

            for cb in &self.epoch_callbacks {
                cb(epoch, &train, &val);
            }
        }

        if !cfg.model_out.is_empty() {
            info!(path = cfg.model_out.as_str(); "saving model");
            self.run_model_job(JobType::SaveModel, &cfg.model_out).await?;
        }

        Ok(())
    }

    /// Shuts the job tracker down.
    pub async fn close(self) {
        self.tracker.close().await;
    }

    async fn run_model_job(&self, job_type: JobType, path: &str) -> Result<()> {
        self.tracker.add(vec![Job::model(job_type, path)])?;
        self.tracker.wait_drained(self.poll).await
    }

    /// Runs one phase over every partition of its data file.
    ///
    /// # Returns
    /// The phase's progress, empty if its data file isn't configured.
    async fn run_epoch(&self, epoch: usize, job_type: JobType) -> Result<Progress> {
        let cfg = &self.ctx.config;
        let filename = match job_type {
            JobType::Validate => &cfg.val_data,
            _ => &cfg.data_in,
        };

        if filename.is_empty() {
            return Ok(Progress::default());
        }

        *self.ctx.progress.lock() = Progress::default();
        self.tracker
            .add(Job::partitions(job_type, epoch, filename, cfg.num_parts))?;

        while self.tracker.num_remains() > 0 {
            time::sleep(self.poll).await;

            let prog = *self.ctx.progress.lock();
            for cb in &self.cont_callbacks {
                cb(&prog);
            }
        }

        if let Some(err) = self.tracker.take_error() {
            return Err(err);
        }

        let prog = *self.ctx.progress.lock();
        info!(epoch = epoch, phase = job_type.as_str(); "{prog}");
        Ok(prog)
    }
}
