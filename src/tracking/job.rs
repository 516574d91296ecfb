use serde::{Deserialize, Serialize};

/// What a `Job` asks its worker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Train,
    Validate,
    Predict,
    SaveModel,
    LoadModel,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Train => "train",
            JobType::Validate => "validate",
            JobType::Predict => "predict",
            JobType::SaveModel => "save_model",
            JobType::LoadModel => "load_model",
        }
    }
}

/// One data partition's worth of scheduler level work.
///
/// Model persistence jobs use `filename` as the model path and ignore the
/// partition fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub epoch: usize,
    pub filename: String,
    pub part_idx: usize,
    pub num_parts: usize,
}

impl Job {
    /// Creates a new `Job`.
    pub fn new(
        job_type: JobType,
        epoch: usize,
        filename: impl Into<String>,
        part_idx: usize,
        num_parts: usize,
    ) -> Self {
        Self {
            job_type,
            epoch,
            filename: filename.into(),
            part_idx,
            num_parts,
        }
    }

    /// One job per partition of `filename`.
    pub fn partitions(job_type: JobType, epoch: usize, filename: &str, num_parts: usize) -> Vec<Job> {
        (0..num_parts)
            .map(|part_idx| Job::new(job_type, epoch, filename, part_idx, num_parts))
            .collect()
    }

    /// A job moving the model between the store and `path`.
    pub fn model(job_type: JobType, path: &str) -> Job {
        Job::new(job_type, 0, path, 0, 1)
    }

    /// Whether this job pushes gradients.
    #[inline]
    pub fn is_training(&self) -> bool {
        self.job_type == JobType::Train
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_cover_every_part() {
        let jobs = Job::partitions(JobType::Validate, 3, "val.txt", 4);
        let parts: Vec<_> = jobs.iter().map(|j| j.part_idx).collect();

        assert_eq!(parts, [0, 1, 2, 3]);
        assert!(jobs.iter().all(|j| j.num_parts == 4 && j.epoch == 3));
        assert!(!jobs[0].is_training());
    }

    #[test]
    fn serialized_shape() {
        let job = Job::new(JobType::SaveModel, 0, "model.json", 0, 1);
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["type"], "save_model");
        assert_eq!(json["filename"], "model.json");
        assert_eq!(serde_json::from_value::<Job>(json).unwrap(), job);
    }
}
