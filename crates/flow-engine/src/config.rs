/// Construction-time knobs for the Execution Engine, threaded through via the teacher's
/// `with_*` builder convention (`CoreTaskExecutor::with_project_root`,
/// `OrchestrationExecutor::with_max_nodes`).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Preview row cap. Fixed at 100 by default per spec.md §9; implementations MAY
    /// expose a different value but must default to 100.
    pub preview_row_cap: usize,
    /// Upper bound on the number of nodes a single pass will schedule, guarding against
    /// pathological documents.
    pub max_nodes_per_pass: usize,
    /// Row sample size used to materialise inputs to `polars_code` and to advanced-mode
    /// `filter` when the interpreter must see the data. Unlike the preview cap this
    /// bounds interpreter round-trip cost, not display size.
    pub interpreter_row_sample_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preview_row_cap: flow_contracts::PREVIEW_ROW_CAP,
            max_nodes_per_pass: 10_000,
            interpreter_row_sample_cap: 50_000,
        }
    }
}

impl EngineConfig {
    pub fn with_preview_row_cap(mut self, cap: usize) -> Self {
        self.preview_row_cap = cap;
        self
    }

    pub fn with_max_nodes_per_pass(mut self, max: usize) -> Self {
        self.max_nodes_per_pass = max;
        self
    }

    pub fn with_interpreter_row_sample_cap(mut self, cap: usize) -> Self {
        self.interpreter_row_sample_cap = cap;
        self
    }
}
