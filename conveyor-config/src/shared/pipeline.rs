use serde::{Deserialize, Serialize};

use crate::shared::{ValidationError, batch::BatchConfig};

/// Complete configuration for a conveyor pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Unique identifier of this pipeline instance.
    pub id: u64,
    /// Batch accumulation settings.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Capacity of the acknowledgement queue between the process and commit
    /// stages.
    ///
    /// Sized large relative to `batch.max_size` so that forwarding cookies
    /// rarely blocks the process stage.
    #[serde(default = "default_ack_buffer_size")]
    pub ack_buffer_size: usize,
}

impl PipelineConfig {
    /// Default capacity of the acknowledgement queue.
    pub const DEFAULT_ACK_BUFFER_SIZE: usize = 256;

    /// Validates pipeline configuration settings.
    ///
    /// Checks the nested batch settings and ensures the acknowledgement queue
    /// has capacity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.batch.validate()?;

        if self.ack_buffer_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "ack_buffer_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_ack_buffer_size() -> usize {
    PipelineConfig::DEFAULT_ACK_BUFFER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(max_size: usize, ack_buffer_size: usize) -> PipelineConfig {
        PipelineConfig {
            id: 1,
            batch: BatchConfig { max_size },
            ack_buffer_size,
        }
    }

    #[test]
    fn validate_accepts_positive_limits() {
        assert!(config_with(5, 256).validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let err = config_with(0, 256).validate().unwrap_err();
        assert!(err.to_string().contains("batch.max_size"));
    }

    #[test]
    fn validate_rejects_zero_ack_buffer() {
        let err = config_with(5, 0).validate().unwrap_err();
        assert!(err.to_string().contains("ack_buffer_size"));
    }
}
