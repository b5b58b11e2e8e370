//! Rendering and the interactive loop behind the `mmsearch` binary. Both
//! write to caller-supplied streams so they can be driven from tests.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use console::style;
use core_types::ResultRow;
use serde_json::{Value, json};
use service::{QueryError, QueryOrchestrator, SearchOutcome};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NO_RESULTS: &str = "no results.";

/// First `max_chars` characters of `text`, with `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Lines for one result; ranks are shown one-based.
pub fn render_row(row: &ResultRow, preview_chars: usize) -> Vec<String> {
    let position = row.rank + 1;
    match &row.record {
        Some(record) => vec![
            format!("[{position}] UID: {} | distance: {:.4}", row.id, row.distance),
            format!("title: {}", record.title),
            format!("content: {}", preview(&record.content, preview_chars)),
        ],
        None => vec![format!("[{position}] record not found for id {}", row.id)],
    }
}

pub fn render_summary(outcome: &SearchOutcome) -> String {
    format!(
        "query '{}' ({:.4}s search, {:.4}s lookup)",
        outcome.query,
        outcome.search_latency.as_secs_f64(),
        outcome.lookup_latency.as_secs_f64()
    )
}

/// Anything that can answer a query the way `QueryOrchestrator` does.
pub trait Searcher {
    fn search(&self, query: &str, k: Option<usize>) -> Result<SearchOutcome, QueryError>;
}

impl Searcher for QueryOrchestrator {
    fn search(&self, query: &str, k: Option<usize>) -> Result<SearchOutcome, QueryError> {
        Self::search(self, query, k)
    }
}

/// Summary line, separator, then one block per row or [`NO_RESULTS`].
pub fn write_outcome(
    out: &mut impl Write,
    outcome: &SearchOutcome,
    preview_chars: usize,
) -> std::io::Result<()> {
    writeln!(out, "{}", style(render_summary(outcome)).cyan())?;
    writeln!(out, "{}", "-".repeat(50))?;
    if outcome.is_empty() {
        return writeln!(out, "{}", style(NO_RESULTS).yellow());
    }
    for row in &outcome.rows {
        let lines = render_row(row, preview_chars);
        if row.is_missing() {
            writeln!(out, "{}", style(&lines[0]).yellow())?;
        } else {
            for line in &lines {
                writeln!(out, "{line}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Read one query per line until `q` or end of input.
///
/// Failed queries are reported on `err` and the loop goes on; only a fatal
/// error (the index is gone) ends it early.
pub fn repl(
    searcher: &impl Searcher,
    input: &mut impl BufRead,
    out: &mut impl Write,
    err: &mut impl Write,
    preview_chars: usize,
) -> Result<()> {
    let mut line = String::new();
    loop {
        write!(out, "\n{} ", style("query (q to quit):").bold())?;
        out.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(());
        }
        let query = line.trim();
        if query == "q" {
            return Ok(());
        }
        match searcher.search(query, None) {
            Ok(outcome) => write_outcome(out, &outcome, preview_chars)?,
            Err(e) if e.is_fatal() => return Err(e).context("search aborted"),
            Err(e) => {
                tracing::warn!(error = %e, "query failed");
                writeln!(err, "{} {e}", style("error:").red().bold())?;
            }
        }
    }
}

pub fn outcome_json(outcome: &SearchOutcome) -> Value {
    json!({
        "query_id": outcome.query_id.to_string(),
        "query": outcome.query,
        "k": outcome.k,
        "search_ms": outcome.search_latency.as_secs_f64() * 1000.0,
        "lookup_ms": outcome.lookup_latency.as_secs_f64() * 1000.0,
        "rows": outcome.rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::DocumentRecord;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::time::Duration;

    /// Replays canned replies in order and records every query it sees.
    struct ScriptedSearcher {
        replies: RefCell<VecDeque<Result<SearchOutcome, QueryError>>>,
        seen: RefCell<Vec<String>>,
    }

    impl ScriptedSearcher {
        fn new(replies: impl IntoIterator<Item = Result<SearchOutcome, QueryError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into_iter().collect()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Searcher for ScriptedSearcher {
        fn search(&self, query: &str, _k: Option<usize>) -> Result<SearchOutcome, QueryError> {
            self.seen.borrow_mut().push(query.to_string());
            self.replies
                .borrow_mut()
                .pop_front()
                .expect("searcher called more often than scripted")
        }
    }

    fn outcome(query: &str, rows: Vec<ResultRow>) -> SearchOutcome {
        SearchOutcome {
            query_id: uuid::Uuid::nil(),
            query: query.to_string(),
            k: 3,
            rows,
            search_latency: Duration::from_millis(2),
            lookup_latency: Duration::from_millis(1),
        }
    }

    fn run(searcher: &ScriptedSearcher, input: &str) -> (Result<()>, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = repl(searcher, &mut Cursor::new(input), &mut out, &mut err, 50);
        (
            result,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn q_ends_the_loop_without_searching() {
        let searcher = ScriptedSearcher::new([]);
        let (result, _, _) = run(&searcher, "  q  \nnever read\n");
        result.unwrap();
        assert!(searcher.seen.borrow().is_empty());
    }

    #[test]
    fn end_of_input_ends_the_loop() {
        let searcher = ScriptedSearcher::new([Ok(outcome("one", Vec::new()))]);
        let (result, _, _) = run(&searcher, "one\n");
        result.unwrap();
        assert_eq!(*searcher.seen.borrow(), ["one"]);
    }

    #[test]
    fn failed_query_is_reported_and_loop_continues() {
        let row = ResultRow {
            rank: 0,
            id: 9,
            distance: 0.25,
            record: Some(DocumentRecord::new(9, "Rates rise", "The bank moved.")),
        };
        let searcher = ScriptedSearcher::new([
            Err(QueryError::InvalidQuery("query is empty".into())),
            Ok(outcome("rates", vec![row])),
        ]);
        let (result, out, err) = run(&searcher, "\nrates\nq\n");
        result.unwrap();
        assert_eq!(*searcher.seen.borrow(), ["", "rates"]);
        assert!(err.contains("invalid query: query is empty"));
        assert!(out.contains("[1] UID: 9 | distance: 0.2500"));
        assert!(out.contains("title: Rates rise"));
    }

    #[test]
    fn empty_outcome_prints_no_results() {
        let searcher = ScriptedSearcher::new([Ok(outcome("nothing", Vec::new()))]);
        let (result, out, err) = run(&searcher, "nothing\nq\n");
        result.unwrap();
        assert!(out.contains(NO_RESULTS));
        assert!(!out.contains("UID:"));
        assert!(err.is_empty());
    }

    #[test]
    fn fatal_error_stops_reading_input() {
        let searcher = ScriptedSearcher::new([Err(QueryError::IndexNotLoaded)]);
        let (result, _, _) = run(&searcher, "first\nsecond\n");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("search aborted"));
        assert_eq!(*searcher.seen.borrow(), ["first"]);
    }

    #[test]
    fn missing_record_is_flagged_in_output() {
        let row = ResultRow {
            rank: 1,
            id: 77,
            distance: 0.5,
            record: None,
        };
        let mut out = Vec::new();
        write_outcome(&mut out, &outcome("x", vec![row]), 50).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("[2] record not found for id 77"));
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        assert_eq!(preview("short", 50), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("가나다라마", 2), "가나...");
        assert_eq!(preview("", 5), "");
    }

    #[test]
    fn found_row_shows_title_and_preview() {
        let row = ResultRow {
            rank: 0,
            id: 5,
            distance: 0.1,
            record: Some(DocumentRecord::new(5, "A", "x".repeat(60))),
        };
        let lines = render_row(&row, 50);
        assert_eq!(lines[0], "[1] UID: 5 | distance: 0.1000");
        assert_eq!(lines[1], "title: A");
        assert_eq!(lines[2], format!("content: {}...", "x".repeat(50)));
    }

    #[test]
    fn missing_row_is_explicit() {
        let row = ResultRow {
            rank: 2,
            id: 42,
            distance: 0.3,
            record: None,
        };
        assert_eq!(render_row(&row, 50), ["[3] record not found for id 42"]);
    }
}
