use crate::error::{Result, TrainErr};

/// Ordered `key=value` pairs, as handed over by the command line.
pub type KwArgs = Vec<(String, String)>;

/// Splits every argument at its first `=`.
///
/// # Arguments
/// * `args` - The raw arguments, e.g. `["task=train", "max_num_epochs=3"]`.
///
/// # Returns
/// The parsed pairs or an `InvalidConfig` for arguments without a `=` or with an empty key.
pub fn parse_kwargs<I, S>(args: I) -> Result<KwArgs>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|arg| {
            let arg = arg.as_ref();
            match arg.split_once('=') {
                Some((key, val)) if !key.trim().is_empty() => {
                    Ok((key.trim().to_string(), val.trim().to_string()))
                }
                _ => Err(TrainErr::InvalidConfig(format!(
                    "expected key=value, got '{arg}'"
                ))),
            }
        })
        .collect()
}
