//! Keyword-based answer quality checks over a fixed question set.

use serde::Serialize;

use crate::answer::{collect_answer, AnswerAssembler};

#[derive(Debug, Clone, Copy)]
pub struct EvalCase {
    pub id: &'static str,
    pub question: &'static str,
    pub expected_keywords: &'static [&'static str],
}

pub const EVAL_CASES: &[EvalCase] = &[
    EvalCase {
        id: "test_01",
        question: "What is the fire rating for corridor partitions?",
        expected_keywords: &["1 hour", "1-hour", "60 min", "fire rating"],
    },
    EvalCase {
        id: "test_02",
        question: "What is the material for door D-101?",
        expected_keywords: &["hollow metal", "steel", "HM"],
    },
    EvalCase {
        id: "test_03",
        question: "Does the lobby floor have terrazzo?",
        expected_keywords: &["yes", "terrazzo", "finish"],
    },
    EvalCase {
        id: "test_04",
        question: "What is the thickness of the exterior glass?",
        expected_keywords: &["6mm", "double glazed", "insulating"],
    },
    EvalCase {
        id: "test_05",
        question: "Is there a requirement for LEED certification?",
        expected_keywords: &["LEED", "certification", "silver", "gold", "platinum"],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvalStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalCaseResult {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub expected_keywords: Vec<String>,
    pub found_keywords: Vec<String>,
    pub status: EvalStatus,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub accuracy: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub summary: EvalSummary,
    pub details: Vec<EvalCaseResult>,
}

/// Expected keywords present in `answer`, case-insensitively.
pub fn found_keywords(answer: &str, expected: &[&str]) -> Vec<String> {
    let answer = answer.to_lowercase();
    expected
        .iter()
        .filter(|kw| answer.contains(&kw.to_lowercase()))
        .map(|kw| kw.to_string())
        .collect()
}

/// Answer every case through the full pipeline, unscoped.
pub async fn run_evals(assembler: &AnswerAssembler, cases: &[EvalCase]) -> EvalReport {
    let mut details = Vec::with_capacity(cases.len());

    for case in cases {
        let (answer, sources) = collect_answer(assembler.answer(case.question, Vec::new(), None).await).await;
        let found = found_keywords(&answer, case.expected_keywords);
        let status = if found.is_empty() {
            EvalStatus::Fail
        } else {
            EvalStatus::Pass
        };
        tracing::info!("Eval {}: {status:?}", case.id);

        details.push(EvalCaseResult {
            id: case.id.to_string(),
            question: case.question.to_string(),
            answer,
            expected_keywords: case.expected_keywords.iter().map(|k| k.to_string()).collect(),
            found_keywords: found,
            status,
            sources: sources.into_iter().map(|s| s.doc_name).collect(),
        });
    }

    EvalReport {
        summary: summarize(&details),
        details,
    }
}

fn summarize(details: &[EvalCaseResult]) -> EvalSummary {
    let total = details.len();
    let passed = details.iter().filter(|d| d.status == EvalStatus::Pass).count();
    let accuracy = if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    };
    EvalSummary {
        total,
        passed,
        failed: total - passed,
        accuracy: format!("{accuracy:.1}%"),
    }
}
