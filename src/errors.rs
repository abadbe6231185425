use thiserror::Error;

/// One decoder's failure inside the acquisition fallback chain.
#[derive(Debug, Clone)]
pub struct DecoderFailure {
    pub decoder: &'static str,
    pub message: String,
}

/// No usable signal could be read from the source.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("all decoders failed for {}: {}", .source_name, summarize(.attempts))]
    AllDecodersFailed {
        source_name: String,
        attempts: Vec<DecoderFailure>,
    },

    #[error("cannot read {}: {}", .source_name, .error)]
    Unreadable {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("decoder chain is empty")]
    NoDecoders,
}

fn summarize(attempts: &[DecoderFailure]) -> String {
    attempts
        .iter()
        .map(|failure| format!("{}: {}", failure.decoder, failure.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Hard failure of a whole extraction; the caller gets no feature record.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("signal contains no samples")]
    EmptySignal,

    #[error("preprocessing failed: {0}")]
    Preprocessing(String),
}

/// Failure local to one analysis branch. Recovered with default values.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BranchError {
    #[error("signal too short: {samples} samples, need at least {required}")]
    TooShort { samples: usize, required: usize },

    #[error("no voiced frames detected")]
    NoVoicedFrames,

    #[error("not enough periods for perturbation analysis: {found}")]
    InsufficientPeriods { found: usize },

    #[error("numerical failure: {0}")]
    Numerical(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_error_lists_every_decoder() {
        let err = AcquisitionError::AllDecodersFailed {
            source_name: "clip.webm".to_string(),
            attempts: vec![
                DecoderFailure {
                    decoder: "symphonia",
                    message: "unsupported codec".to_string(),
                },
                DecoderFailure {
                    decoder: "wav-first-channel",
                    message: "not a RIFF file".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("clip.webm"));
        assert!(text.contains("symphonia: unsupported codec"));
        assert!(text.contains("wav-first-channel: not a RIFF file"));
    }
}
