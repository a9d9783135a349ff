//! Report result types

use crate::agents::{NewsDigest, SemanticFindings, StructuredFindings};
use crate::error::{ErrorKind, Result};
use crate::time_range::TimeRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a stage produced no payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one pipeline stage, captured as a value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Success { data: T },
    Failed(StageFailure),
}

impl<T> StageOutcome<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(err) => Self::Failed(StageFailure {
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } => Some(data),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// Everything one report request produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBundle {
    pub query: String,
    pub range: TimeRange,
    pub semantic: StageOutcome<SemanticFindings>,
    pub structured: StageOutcome<StructuredFindings>,
    pub news: StageOutcome<NewsDigest>,
    pub generated_at: DateTime<Utc>,
}

impl ReportBundle {
    /// Whether every stage failed
    pub fn is_empty(&self) -> bool {
        !self.semantic.is_success() && !self.structured.is_success() && !self.news.is_success()
    }

    /// Human-readable report
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# Research report: {}\n\n", self.query);
        out.push_str(&format!(
            "_Periods {} | generated {}_\n\n",
            self.range,
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        ));

        out.push_str("## Document analysis\n\n");
        match &self.semantic {
            StageOutcome::Success { data } => {
                if let Some(analysis) = &data.analysis {
                    out.push_str(analysis.trim());
                    out.push_str("\n\n");
                }
                out.push_str(&format!("{} matching passages:\n\n", data.matches.len()));
                for m in &data.matches {
                    out.push_str(&format!(
                        "- **{} Q{}** ({:.3}): {}\n",
                        m.year,
                        m.quarter,
                        m.score,
                        excerpt(&m.text, 200)
                    ));
                }
                out.push('\n');
            }
            StageOutcome::Failed(failure) => push_failure(&mut out, failure),
        }

        out.push_str("## Market data\n\n");
        match &self.structured {
            StageOutcome::Success { data } => {
                out.push_str(&format!(
                    "```sql\n{}\n```\n\n{} rows\n\n",
                    data.query.statement, data.row_count
                ));
                if data.chart_urls.is_empty() {
                    out.push_str("_No charts produced._\n\n");
                }
                for (i, url) in data.chart_urls.iter().enumerate() {
                    out.push_str(&format!("![chart {}]({url})\n\n", i + 1));
                }
            }
            StageOutcome::Failed(failure) => push_failure(&mut out, failure),
        }

        out.push_str("## News\n\n");
        match &self.news {
            StageOutcome::Success { data } => {
                out.push_str(data.summary.trim());
                out.push_str("\n\n");
                // Nest the digest sections below this one
                for line in data.markdown.lines() {
                    if line.starts_with("## ") {
                        out.push('#');
                    }
                    out.push_str(line);
                    out.push('\n');
                }
            }
            StageOutcome::Failed(failure) => push_failure(&mut out, failure),
        }
        out
    }
}

fn push_failure(out: &mut String, failure: &StageFailure) {
    out.push_str(&format!(
        "> **Unavailable** ({}): {}\n\n",
        failure.kind, failure.message
    ));
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{GeneratedQuery, RetrievalMatch};
    use crate::error::ResearchError;
    use crate::time_range::Quarter;

    fn bundle() -> ReportBundle {
        ReportBundle {
            query: "revenue trends".to_string(),
            range: "2023:1,4".parse().unwrap(),
            semantic: StageOutcome::from_result(Ok(SemanticFindings {
                matches: vec![RetrievalMatch {
                    text: "Revenue   grew\n 20%".to_string(),
                    year: 2023,
                    quarter: Quarter::new(1).unwrap(),
                    score: 0.91,
                }],
                analysis: Some("Year: 2023, Quarter: 1\nGrowth.".to_string()),
            })),
            structured: StageOutcome::from_result(Ok(StructuredFindings {
                query: GeneratedQuery {
                    statement: "SELECT DATE, CLOSE FROM T;".to_string(),
                    question: "revenue trends".to_string(),
                },
                columns: vec!["DATE".into(), "CLOSE".into()],
                row_count: 2,
                chart_urls: vec!["https://s3.test/charts/run/CLOSE.svg".to_string()],
            })),
            news: StageOutcome::from_result(Err(ResearchError::upstream("serpapi", "down"))),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let ok: StageOutcome<u32> = StageOutcome::from_result(Ok(7));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"status": "success", "data": 7})
        );

        let failed: StageOutcome<u32> =
            StageOutcome::from_result(Err(ResearchError::NoMatches("nothing".to_string())));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({
                "status": "failed",
                "kind": "no_matches",
                "message": "No matches: nothing"
            })
        );
        assert_eq!(failed.failure().unwrap().kind, ErrorKind::NoMatches);
        assert!(failed.data().is_none());
    }

    #[test]
    fn test_bundle_round_trips_through_json() {
        let json = serde_json::to_string(&bundle()).unwrap();
        let back: ReportBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(back.range.len(), 2);
        assert_eq!(back.semantic.data().unwrap().matches[0].quarter.get(), 1);
        assert!(!back.news.is_success());
    }

    #[test]
    fn test_markdown_sections() {
        let md = bundle().to_markdown();
        assert!(md.starts_with("# Research report: revenue trends\n"));
        assert!(md.contains("_Periods 2023:1,4 |"));
        assert!(md.contains("- **2023 Q1** (0.910): Revenue grew 20%"));
        assert!(md.contains("```sql\nSELECT DATE, CLOSE FROM T;\n```"));
        assert!(md.contains("![chart 1](https://s3.test/charts/run/CLOSE.svg)"));
        assert!(md.contains("> **Unavailable** (upstream_unavailable): serpapi unavailable: down"));
    }

    #[test]
    fn test_excerpt_cuts_on_char_boundary() {
        assert_eq!(excerpt("héllo wörld", 4), "héll...");
        assert_eq!(excerpt("short", 10), "short");
    }
}
