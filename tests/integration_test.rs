use logtally::{Analyzer, EndpointReport, LogTable};

#[test]
fn end_to_end_report() {
    let logs = vec![
        "at=info method=GET path=/api/users/1/get_messages connect=10ms service=20ms dyno=web.1",
        "",
        "at=info method=GET path=/api/users/2/get_messages connect=5ms service=5ms dyno=web.2",
    ];

    let table = LogTable::parse(logs);
    assert_eq!(table.len(), 2);

    let report = Analyzer::new().render(&table).expect("report should render");
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines.len(), 1);

    let parsed: serde_json::Value =
        serde_json::from_str(lines[0]).expect("report line should be valid JSON");
    assert_eq!(
        parsed["request_identifier"],
        "GET /api/users/{user_id}/get_messages"
    );
    assert_eq!(parsed["called"], serde_json::json!(2));
    assert_eq!(parsed["response_time_mean"], serde_json::json!(20));
    assert_eq!(parsed["response_time_median"], serde_json::json!(20));
    // tied dyno counts resolve to the first one encountered
    assert_eq!(parsed["dyno_mode"], "web.1");
}

#[test]
fn report_lines_round_trip() {
    let logs = vec![
        "at=info method=GET path=/api/users/1/get_messages connect=10ms service=20ms dyno=web.1",
        "at=info method=GET path=/api/users/1/get_friends_score connect=3ms service=4ms dyno=web.2",
        "at=info method=GET path=/api/users/2/get_friends_score connect=1ms service=2ms dyno=web.2",
    ];

    let table = LogTable::parse(logs);
    let analyzer = Analyzer::new();
    let reports = analyzer.reports(&table).expect("reports should compute");
    let rendered = analyzer.render(&table).expect("report should render");

    let parsed: Vec<EndpointReport> = rendered
        .lines()
        .map(|line| serde_json::from_str(line).expect("report line should deserialize"))
        .collect();
    assert_eq!(parsed, reports);
}

#[test]
fn absent_methods_are_not_reported() {
    let logs = vec![
        "at=info method=GET path=/api/users/1/get_friends_progress connect=1ms service=2ms dyno=web.1",
    ];

    let table = LogTable::parse(logs);
    let report = Analyzer::new().render(&table).expect("report should render");

    assert_eq!(report.lines().count(), 1);
    assert!(report.contains("get_friends_progress"));
    assert!(!report.contains("count_pending_messages"));
    assert!(!report.contains("get_messages"));
    assert!(!report.contains("get_friends_score"));
}

#[test]
fn bad_timing_aborts_the_whole_report() {
    let logs = vec![
        "at=info method=GET path=/api/users/1/count_pending_messages connect=1ms service=2ms dyno=web.1",
        "at=info method=GET path=/api/users/1/get_messages connect=bogus service=2ms dyno=web.1",
    ];

    let table = LogTable::parse(logs);
    // the first endpoint alone would report fine, but nothing is emitted
    assert!(Analyzer::new().render(&table).is_err());
}
