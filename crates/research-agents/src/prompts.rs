//! Prompt templates for the language-model calls
//!
//! Templates are MiniJinja sources registered once in a [`PromptSet`] and
//! rendered with serde contexts.

use crate::config::TableSchema;
use crate::error::Result;
use crate::time_range::TimeRange;
use minijinja::{Environment, Value};
use serde::Serialize;

const SQL_SYNTHESIS: &str = r"You write SQL for a table of daily financial data about {{ company }}.

Table: {{ schema.table }}
Columns:
{% for column in schema.columns -%}
- `{{ column.name }} {{ column.sql_type }}`: {{ column.description }}
{% endfor %}
Rules:
- Identify the columns relevant to the question.
- Return individual records (no aggregation) with the date, year and quarter columns alongside the relevant metrics.
- Filter on the `{{ year_column }}` and `{{ quarter_column }}` columns directly; do not derive them from `{{ time_column }}`.
- Return exactly one statement inside a ```sql code block and end it with a semicolon.
- Put any explanation after the code block, never before it.

Question: {{ question }}

Time range (year to quarters): {{ range }}
";

const QUARTER_ANALYSIS: &str = r"You are analysing financial documents about {{ company }}.
Below is context retrieved from indexed filings; each line is tagged with its year and quarter.
Answer the question separately for every year and quarter present in the context.

Question: {{ question }}

Context:
{% for line in context -%}
{{ line }}
{% endfor %}
Instructions:
- Start each answer with a heading such as `Year: 2023, Quarter: 1`.
- Cover key highlights, trends and performance metrics for that quarter, about {{ words }} words.
- Mention both positive and negative developments and do not mix quarters.
";

const NEWS_SUMMARY: &str = r"Summarise the recent news about {{ company }} below for an analyst asking: {{ question }}

Use both sections. Lead with the developments that matter most to the question, then note broader company news. Keep it under 300 words.

{{ news }}
";

/// Registered prompt templates
pub struct PromptSet {
    env: Environment<'static>,
}

#[derive(Serialize)]
struct SqlContext<'a> {
    company: &'a str,
    schema: &'a TableSchema,
    question: &'a str,
    range: String,
    time_column: &'a str,
    year_column: &'a str,
    quarter_column: &'a str,
}

/// Inputs for the statement synthesis prompt
pub struct SqlPromptInput<'a> {
    pub company: &'a str,
    pub schema: &'a TableSchema,
    pub question: &'a str,
    pub range: &'a TimeRange,
    pub time_column: &'a str,
    pub year_column: &'a str,
    pub quarter_column: &'a str,
}

impl PromptSet {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("sql_synthesis", SQL_SYNTHESIS)?;
        env.add_template("quarter_analysis", QUARTER_ANALYSIS)?;
        env.add_template("news_summary", NEWS_SUMMARY)?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: impl Serialize) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(Value::from_serialize(&ctx))?)
    }

    /// Prompt asking for one `SELECT ... ;` statement over the table
    pub fn sql_synthesis(&self, input: &SqlPromptInput<'_>) -> Result<String> {
        let range = serde_json::to_string(&input.range.to_prompt_map())?;
        self.render(
            "sql_synthesis",
            SqlContext {
                company: input.company,
                schema: input.schema,
                question: input.question,
                range,
                time_column: input.time_column,
                year_column: input.year_column,
                quarter_column: input.quarter_column,
            },
        )
    }

    /// Prompt for a per-quarter analysis of retrieved context lines
    pub fn quarter_analysis(
        &self,
        company: &str,
        question: &str,
        context: &[String],
        words: usize,
    ) -> Result<String> {
        self.render(
            "quarter_analysis",
            serde_json::json!({
                "company": company,
                "question": question,
                "context": context,
                "words": words,
            }),
        )
    }

    /// Prompt summarising the combined news markdown
    pub fn news_summary(&self, company: &str, question: &str, news: &str) -> Result<String> {
        self.render(
            "news_summary",
            serde_json::json!({
                "company": company,
                "question": question,
                "news": news,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResearchConfig;

    #[test]
    fn test_sql_prompt_contains_schema_and_range() {
        let prompts = PromptSet::new().unwrap();
        let config = ResearchConfig::default();
        let range: TimeRange = "2023:1,4".parse().unwrap();

        let prompt = prompts
            .sql_synthesis(&SqlPromptInput {
                company: &config.company,
                schema: &config.schema,
                question: "closing price trend",
                range: &range,
                time_column: &config.time_column,
                year_column: &config.year_column,
                quarter_column: &config.quarter_column,
            })
            .unwrap();

        assert!(prompt.contains("Table: NVIDIA_FIN_DATA"));
        assert!(prompt.contains("- `VOLATILITY20D FLOAT`: 20-day volatility"));
        assert!(prompt.contains("Question: closing price trend"));
        assert!(prompt.contains(r#"{"2023":["1","4"]}"#));
        assert!(prompt.contains("end it with a semicolon"));
    }

    #[test]
    fn test_quarter_analysis_lists_context() {
        let prompts = PromptSet::new().unwrap();
        let context = vec![
            "Year: 2023, Quarter: 1 - Revenue grew".to_string(),
            "Year: 2023, Quarter: 4 - Margins expanded".to_string(),
        ];

        let prompt = prompts
            .quarter_analysis("NVIDIA", "revenue trends", &context, 500)
            .unwrap();

        assert!(prompt.contains(
            "Year: 2023, Quarter: 1 - Revenue grew\nYear: 2023, Quarter: 4 - Margins expanded"
        ));
        assert!(prompt.contains("about 500 words"));
    }

    #[test]
    fn test_news_summary_embeds_markdown() {
        let prompts = PromptSet::new().unwrap();
        let prompt = prompts
            .news_summary("NVIDIA", "chip exports", "## Query news\n##### Title")
            .unwrap();
        assert!(prompt.contains("asking: chip exports"));
        assert!(prompt.contains("##### Title"));
    }
}
