use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use std::path::Path;

use crate::test::TbTests;

pub(crate) fn create_junit_xml(suite: &str, tests: &TbTests, path: &Path) -> Result<(), String> {
    let mut test_cases = Vec::new();

    for t in tests.iter() {
        let tc = match &t.result {
            Some(Ok(_)) => TestCaseBuilder::success(&t.name, Duration::seconds_f64(t.time_secs)),
            Some(Err(e)) => TestCaseBuilder::failure(
                &t.name,
                Duration::seconds_f64(t.time_secs),
                "failure",
                &format!("{:?}", e),
            ),
            None => TestCaseBuilder::failure(&t.name, Duration::ZERO, "not run", "test was not run"),
        }
        .build();
        test_cases.push(tc);
    }

    let test_suite = TestSuiteBuilder::new(suite).add_testcases(test_cases).build();
    let report = ReportBuilder::new().add_testsuite(test_suite).build();
    let file = std::fs::File::create(path).map_err(|e| e.to_string())?;
    report.write_xml(file).map_err(|e| format!("{:?}", e))
}
