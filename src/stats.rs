use std::time::Duration;

/// How many failure examples are kept per stage for the summary
pub const MAX_FAILURE_EXAMPLES: usize = 3;

/// Counters collected while driving a source file into a raw artifact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub lines_read: usize,
    pub lines_skipped_empty: usize,
    pub lines_parsed: usize,
    pub parse_failures: usize,
    pub batches_uploaded: usize,
    pub records_uploaded: usize,
    pub failure_examples: Vec<String>,
}

impl CollectStats {
    pub fn record_parse_failure(&mut self, message: String) {
        self.parse_failures += 1;
        if self.failure_examples.len() < MAX_FAILURE_EXAMPLES {
            self.failure_examples.push(message);
        }
    }
}

/// Counters collected while flattening a raw artifact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub lines_read: usize,
    pub records_transformed: usize,
    pub decode_failures: usize,
    pub failure_examples: Vec<String>,
}

impl TransformStats {
    pub fn record_decode_failure(&mut self, message: String) {
        self.decode_failures += 1;
        if self.failure_examples.len() < MAX_FAILURE_EXAMPLES {
            self.failure_examples.push(message);
        }
    }
}

/// Everything a pipeline run achieved, successful or not
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub collect: Option<CollectStats>,
    pub transform: Option<TransformStats>,
    pub processing_time: Duration,
}

impl PipelineStats {
    pub fn format_stats(&self) -> String {
        let mut output = String::new();

        match &self.collect {
            Some(collect) => {
                output.push_str(&format!(
                    "Lines processed: {} total, {} parsed, {} unparseable; Records uploaded: {} in {} batches",
                    collect.lines_read,
                    collect.lines_parsed,
                    collect.parse_failures,
                    collect.records_uploaded,
                    collect.batches_uploaded
                ));
            }
            None => output.push_str("Collection skipped"),
        }

        match &self.transform {
            Some(transform) => {
                output.push_str(&format!(
                    "; Records transformed: {}, {} undecodable",
                    transform.records_transformed, transform.decode_failures
                ));
            }
            None => output.push_str("; Transform skipped"),
        }

        let processing_time_ms = self.processing_time.as_millis();
        output.push_str(&format!(" in {}ms", processing_time_ms));

        if let Some(collect) = &self.collect {
            if processing_time_ms > 0 && collect.lines_read > 0 {
                let lines_per_sec = (collect.lines_read as f64 * 1000.0) / processing_time_ms as f64;
                output.push_str(&format!(" ({:.0} lines/s)", lines_per_sec));
            }
        }

        output
    }
}
