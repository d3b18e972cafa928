use axum::extract::State;
use axum::Json;

use crate::evaluation::{run_evals, EvalReport, EVAL_CASES};
use crate::state::AppState;

/// POST /api/eval/run-tests - answer the fixed question set and score it.
pub async fn run_tests(State(state): State<AppState>) -> Json<EvalReport> {
    Json(run_evals(&state.assembler, EVAL_CASES).await)
}
