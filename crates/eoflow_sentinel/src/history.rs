use eoflow_engine::JobStatusReport;
use eoflow_ledger::HistoryRecord;

/// History row for a job whose terminal state was consumed.
pub fn history_record(report: &JobStatusReport) -> HistoryRecord {
    HistoryRecord {
        state: report.state.clone(),
        description: report.description.clone(),
        priority: report.priority,
        creation_ts: report.creation_ts,
        update_ts: report.update_ts,
        start_ts: report.start_ts,
        task_type: report.task_type.clone(),
        destination: report.destination.clone(),
        attempt: report.attempt,
        usage_seconds: report.usage_seconds,
        id: report.id.clone(),
        name: report.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_record_copies_report() {
        let report = JobStatusReport {
            id: "J-1".to_string(),
            state: "COMPLETED".to_string(),
            description: "P:a I:b".to_string(),
            attempt: Some(2),
            usage_seconds: Some(12.5),
            ..Default::default()
        };
        let record = history_record(&report);
        assert_eq!(record.id, "J-1");
        assert_eq!(record.state, "COMPLETED");
        assert_eq!(record.attempt, Some(2));
        assert_eq!(record.usage_seconds, Some(12.5));
    }
}
