use serde_json::Value;

use crate::error::{AppError, AppResult, ComponentError};

use super::{
    AverageStatisticWriter, CounterStatisticsWriter, StatisticHolder, StatisticsWriter,
    ValueHistogram, create_writer,
};

#[test]
fn average_writer_reports_average_and_percentiles() -> AppResult<()> {
    let writer = AverageStatisticWriter::new()?;
    for value in [10, 20, 30, 40] {
        writer.update(value)?;
    }
    let snapshot = writer.snapshot()?;
    if snapshot.get("average").and_then(Value::as_i64) != Some(25) {
        return Err(AppError::component(format!("Unexpected snapshot: {}", snapshot)));
    }
    if snapshot.get("min").and_then(Value::as_i64) != Some(10)
        || snapshot.get("max").and_then(Value::as_i64) != Some(40)
    {
        return Err(AppError::component(format!("Unexpected bounds: {}", snapshot)));
    }
    let median = snapshot.get("median").and_then(Value::as_u64).unwrap_or(0);
    if !(19..=21).contains(&median) {
        return Err(AppError::component(format!("Unexpected median: {}", median)));
    }
    Ok(())
}

#[test]
fn average_writer_merges_remote_snapshots() -> AppResult<()> {
    let local = AverageStatisticWriter::new()?;
    local.update(10)?;
    let remote = AverageStatisticWriter::new()?;
    remote.update(30)?;
    remote.update(50)?;

    local.merge(&remote.snapshot()?)?;
    let snapshot = local.snapshot()?;
    if snapshot.get("count").and_then(Value::as_i64) != Some(3) {
        return Err(AppError::component(format!("Unexpected count: {}", snapshot)));
    }
    if snapshot.get("average").and_then(Value::as_i64) != Some(30) {
        return Err(AppError::component(format!("Unexpected average: {}", snapshot)));
    }
    Ok(())
}

#[test]
fn counter_writer_merge_adds_totals() -> AppResult<()> {
    let writer = CounterStatisticsWriter::default();
    writer.update(4)?;
    writer.merge(&serde_json::json!({ "total": 6 }))?;
    if writer.snapshot()?.get("total").and_then(Value::as_i64) != Some(10) {
        return Err(AppError::component("Counter merge did not add totals"));
    }
    if writer.merge(&serde_json::json!({})).is_ok() {
        return Err(AppError::component("Malformed snapshot should be rejected"));
    }
    Ok(())
}

#[test]
fn unknown_writer_type_is_rejected() -> AppResult<()> {
    match create_writer("PERCENTILE") {
        Err(AppError::Component(ComponentError::UnknownWriterType { writer_type }))
            if writer_type == "PERCENTILE" =>
        {
            Ok(())
        }
        Err(err) => Err(err),
        Ok(_) => Err(AppError::component("Unknown writer type was accepted")),
    }
}

#[test]
fn holder_release_detaches_writers() -> AppResult<()> {
    let holder = StatisticHolder::default();
    let variable = holder.add_variable_with_writer("Requests", CounterStatisticsWriter::TYPE)?;
    variable.update(3);
    if holder.add_variable("Requests").writer_types() != vec![CounterStatisticsWriter::TYPE] {
        return Err(AppError::component("Variable was not reused"));
    }
    holder.release();
    if !holder.is_empty() || !variable.writer_types().is_empty() {
        return Err(AppError::component("Release left writers attached"));
    }
    Ok(())
}

#[test]
fn histogram_round_trips_through_base64() -> AppResult<()> {
    let mut histogram = ValueHistogram::new()?;
    histogram.record(12)?;
    histogram.record(-5)?;
    let decoded = ValueHistogram::decode_base64(&histogram.encode_base64()?)?;
    if decoded.count() != 2 {
        return Err(AppError::component(format!(
            "Unexpected decoded count: {}",
            decoded.count()
        )));
    }
    Ok(())
}

#[test]
fn holder_merges_a_remote_holder_snapshot() -> AppResult<()> {
    let remote = StatisticHolder::default();
    let latency = remote.add_variable_with_writer("Latency", AverageStatisticWriter::TYPE)?;
    latency.update(100);
    latency.update(300);
    remote
        .add_variable_with_writer("Requests", CounterStatisticsWriter::TYPE)?
        .update(2);

    let local = StatisticHolder::default();
    local
        .add_variable_with_writer("Latency", AverageStatisticWriter::TYPE)?
        .update(200);
    local.merge(&remote.snapshot()?)?;

    let Some(merged) = local
        .variable("Latency")
        .and_then(|variable| variable.writer(AverageStatisticWriter::TYPE))
    else {
        return Err(AppError::component("Latency writer missing after merge"));
    };
    let snapshot = merged.snapshot()?;
    if snapshot.get("count").and_then(Value::as_i64) != Some(3)
        || snapshot.get("average").and_then(Value::as_i64) != Some(200)
    {
        return Err(AppError::component(format!("Unexpected merge: {}", snapshot)));
    }
    let requests = local
        .variable("Requests")
        .and_then(|variable| variable.writer(CounterStatisticsWriter::TYPE));
    let total = requests
        .map(|writer| writer.snapshot())
        .transpose()?
        .and_then(|snapshot| snapshot.get("total").and_then(Value::as_i64));
    if total != Some(2) {
        return Err(AppError::component("Remote-only variable was not created"));
    }
    if local.merge(&serde_json::json!({ "Latency": 5 })).is_ok() {
        return Err(AppError::component("Malformed holder snapshot accepted"));
    }
    Ok(())
}
