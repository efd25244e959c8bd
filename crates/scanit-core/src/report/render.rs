use crate::TOOL_NAME;
use crate::report::model::RunReport;

pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {}\n", TOOL_NAME, report.tool.version));
    for s in &report.scenarios {
        out.push_str(&format!("{:<8} {}", s.verdict, s.name));
        if let Some(state) = &s.session_state {
            out.push_str(&format!(" [{state}]"));
        }
        out.push('\n');
        if let Some(fixture) = &s.fixture {
            out.push_str(&format!(
                "  fixture: {} ({} files, {} {})\n",
                fixture.name, fixture.files, fixture.digest.algorithm, fixture.digest.value
            ));
        }
        for d in &s.diagnostics {
            out.push_str(&format!("  diagnostic: {d}\n"));
        }
        for f in &s.failures {
            out.push_str(&format!("  - {f}\n"));
        }
        if let Some(error) = &s.error {
            out.push_str(&format!("  error: {error}\n"));
        }
        if let Some(reason) = &s.skip_reason {
            out.push_str(&format!("  skipped: {reason}\n"));
        }
    }
    let summary = &report.summary;
    out.push_str(&format!(
        "Passed: {}, failed: {}, errored: {}, skipped: {}\n",
        summary.passed, summary.failed, summary.errored, summary.skipped
    ));
    out
}
