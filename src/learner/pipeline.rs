use std::{fs::File, sync::Arc};

use log::debug;
use tokio::task;

use super::Context;
use crate::{
    data::{BatchIter, Compacted, FeaId, Localizer, Real, RowBlock},
    error::{Result, TrainErr},
    loss::Progress,
    storage::{self, Channel, Pulled},
    tracking::{Job, JobType, POLL_INTERVAL, Tracker},
};

/// One localized batch of a job, owned by its pull, compute, push chain.
struct BatchJob {
    job_type: JobType,
    data: RowBlock<u32>,
    feaids: Arc<[FeaId]>,
}

/// What's left of a batch once the loss is done with its rows.
struct Computed {
    progress: Progress,
    grad: Option<(Vec<Real>, Vec<u32>)>,
}

/// Handles one `Job`, completing only once all of its work completed.
pub(super) async fn process(ctx: Arc<Context>, job: Job) -> Result<()> {
    match job.job_type {
        JobType::SaveModel => save_model(ctx, job.filename).await,
        JobType::LoadModel => load_model(ctx, job.filename).await,
        _ => process_file(ctx, job).await,
    }
}

async fn save_model(ctx: Arc<Context>, path: String) -> Result<()> {
    let store = Arc::clone(ctx.store.store());

    let job = task::spawn_blocking(move || {
        let file = File::create(&path)?;
        storage::save_model(store.as_ref(), file).map(|_| ())
    });

    job.await.map_err(|e| TrainErr::TaskFailed(e.to_string()))?
}

async fn load_model(ctx: Arc<Context>, path: String) -> Result<()> {
    let store = Arc::clone(ctx.store.store());

    let job = task::spawn_blocking(move || {
        let file = File::open(&path)?;
        storage::load_model(store.as_ref(), file).map(|_| ())
    });

    job.await.map_err(|e| TrainErr::TaskFailed(e.to_string()))?
}

/// Streams the job's partition through the store in batches.
///
/// At most `max_inflight` batches are in flight at once. During the first
/// training epoch the feature counts of a batch are pushed, and waited on,
/// before the batch is submitted.
async fn process_file(ctx: Arc<Context>, job: Job) -> Result<()> {
    let cfg = &ctx.config;
    let mut reader = open_reader(&ctx, &job).await?;
    let localizer = Localizer::new(cfg.num_threads);
    let push_counts = job.is_training() && job.epoch == 0;

    let mut tracker = Tracker::new();
    let batch_ctx = Arc::clone(&ctx);
    tracker.set_consumer(move |batch: BatchJob| run_batch(Arc::clone(&batch_ctx), batch));

    let mut num_batches = 0;
    let read = async {
        while let Some(raw) = reader.next_batch()? {
            let Compacted {
                data,
                feaids,
                counts,
            } = localizer.compact(&raw, push_counts);
            let feaids: Arc<[FeaId]> = Arc::from(feaids);

            if let Some(counts) = counts {
                ctx.store
                    .push_and_wait(Channel::FeatureCount, Arc::clone(&feaids), counts, Vec::new())
                    .await?;
            }

            tracker.wait_below(cfg.max_inflight, POLL_INTERVAL).await;
            tracker.add([BatchJob {
                job_type: job.job_type,
                data,
                feaids,
            }])?;
            num_batches += 1;
        }

        Ok::<_, TrainErr>(())
    }
    .await;

    // submitted batches always run to completion
    let drained = tracker.wait_drained(POLL_INTERVAL).await;

    debug!(
        epoch = job.epoch,
        part = job.part_idx,
        batches = num_batches;
        "{} job finished", job.job_type.as_str()
    );

    read.and(drained)
}

async fn open_reader(ctx: &Context, job: &Job) -> Result<BatchIter> {
    let cfg = &ctx.config;
    let (filename, format) = (job.filename.clone(), cfg.data_format.clone());
    let (part_idx, num_parts) = (job.part_idx, job.num_parts);
    let (batch_size, shuffle) = (cfg.batch_size, cfg.shuffle && job.is_training());
    let neg_sampling = if job.is_training() { cfg.neg_sampling } else { 1. };

    let open = task::spawn_blocking(move || {
        BatchIter::new(
            filename,
            &format,
            part_idx,
            num_parts,
            batch_size,
            shuffle,
            neg_sampling,
        )
    });

    open.await.map_err(|e| TrainErr::TaskFailed(e.to_string()))?
}

/// Pulls the batch's weights, evaluates it and, when training, pushes its gradient.
///
/// The rows are consumed by the loss computation, the pulled buffers are
/// reused for the gradient and handed over to the push.
async fn run_batch(ctx: Arc<Context>, batch: BatchJob) -> Result<()> {
    let BatchJob {
        job_type,
        data,
        feaids,
    } = batch;

    let pulled = ctx.store.pull(Channel::Weight, Arc::clone(&feaids)).await?;

    let compute_ctx = Arc::clone(&ctx);
    let job = task::spawn_blocking(move || compute(&compute_ctx, job_type, data, pulled));
    let Computed { progress, grad } = job
        .await
        .map_err(|e| TrainErr::TaskFailed(e.to_string()))??;

    ctx.progress.lock().merge(&progress);

    match grad {
        Some((grad, lens)) => {
            ctx.store
                .push_and_wait(Channel::Gradient, feaids, grad, lens)
                .await
        }
        None => Ok(()),
    }
}

fn compute(ctx: &Context, job_type: JobType, data: RowBlock<u32>, pulled: Pulled) -> Result<Computed> {
    let Pulled { mut vals, lens } = pulled;

    let margins = ctx.loss.init_data(&data, &vals, &lens)?;
    let progress = ctx.loss.evaluate(&data, &margins);

    let grad = match job_type {
        JobType::Train => {
            ctx.loss.calc_grad(&data, &margins, &mut vals)?;
            Some((vals, lens))
        }
        JobType::Predict => {
            ctx.sink.write(&ctx.loss.predict(&margins))?;
            None
        }
        _ => None,
    };

    Ok(Computed { progress, grad })
}
