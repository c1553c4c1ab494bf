//! Feedback commands: submit a correction, replay the outbox, list the dataset

use anyhow::{bail, Context, Result};
use estimator_lib::{
    feedback::{AppendOutcome, FeedbackOutbox, FeedbackStore},
    schema, storage, FeedbackRecord, Settings,
};
use serde::Serialize;
use tabled::Tabled;

use super::FeatureArgs;
use crate::output::{
    color_outcome, format_flag, print_heading, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

fn feedback_store(settings: &Settings) -> Result<FeedbackStore> {
    let objects = storage::object_store_from_settings(settings).context("object store")?;
    Ok(FeedbackStore::new(
        objects,
        settings.feedback_bucket.clone(),
        settings.feedback_key.clone(),
    ))
}

fn open_outbox(settings: &Settings) -> Result<Option<FeedbackOutbox>> {
    settings
        .outbox_path
        .as_ref()
        .map(|path| {
            FeedbackOutbox::open(path)
                .with_context(|| format!("opening outbox {}", path.display()))
        })
        .transpose()
}

#[derive(Debug, Serialize)]
struct SubmitOutput {
    outcome: &'static str,
    price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<usize>,
}

/// Append one correction to the shared dataset
///
/// When the store is unavailable and an outbox is configured, the
/// correction is staged there for `ape feedback flush`.
pub async fn submit(
    settings: &Settings,
    features: &FeatureArgs,
    price: i64,
    format: OutputFormat,
) -> Result<()> {
    let record = FeedbackRecord::new(features.validate()?, price);
    let store = feedback_store(settings)?;

    let output = match store.append(&record).await {
        Ok(AppendOutcome::Appended) => SubmitOutput {
            outcome: "appended",
            price,
            pending: None,
        },
        Ok(AppendOutcome::Discarded) => SubmitOutput {
            outcome: "discarded",
            price,
            pending: None,
        },
        Err(e) if e.is_storage_failure() => {
            let Some(mut outbox) = open_outbox(settings)? else {
                return Err(e).context("feedback store unavailable and no outbox configured");
            };
            let pending = outbox.stage(record, e.to_string())?;
            SubmitOutput {
                outcome: "staged",
                price,
                pending: Some(pending),
            }
        }
        Err(e) => return Err(e.into()),
    };

    match format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Table => {
            let outcome = color_outcome(output.outcome);
            match output.pending {
                Some(pending) => print_warning(&format!(
                    "Feedback {} locally ({} pending); run `ape feedback flush` later",
                    outcome, pending
                )),
                None if output.outcome == "discarded" => print_warning(&format!(
                    "Feedback {}: price must be positive",
                    outcome
                )),
                None => print_success(&format!(
                    "Feedback {} to {}",
                    outcome,
                    store.location()
                )),
            }
        }
    }
    Ok(())
}

/// Replay staged corrections against the store
pub async fn flush(settings: &Settings, format: OutputFormat) -> Result<()> {
    let Some(mut outbox) = open_outbox(settings)? else {
        bail!("no outbox configured (set APE_OUTBOX_PATH)");
    };
    if outbox.is_empty() {
        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "replayed": 0, "dropped": 0, "remaining": 0 }))?,
            OutputFormat::Table => print_info("Outbox is empty"),
        }
        return Ok(());
    }

    let store = feedback_store(settings)?;
    let report = outbox
        .flush_pending(&store)
        .await
        .context("feedback store still unavailable")?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_success(&format!("Replayed {} staged record(s)", report.replayed));
            if report.dropped > 0 {
                print_warning(&format!("Dropped {} invalid record(s)", report.dropped));
            }
            if report.remaining > 0 {
                print_warning(&format!("{} record(s) still pending", report.remaining));
            }
        }
    }
    Ok(())
}

/// Row for the feedback table
#[derive(Tabled)]
struct FeedbackRow {
    #[tabled(rename = "m²")]
    living_area: String,
    #[tabled(rename = "Rooms")]
    rooms: String,
    #[tabled(rename = "Bed")]
    bedrooms: u8,
    #[tabled(rename = "Bath")]
    bathrooms: u8,
    #[tabled(rename = "Elevator")]
    elevator: &'static str,
    #[tabled(rename = "Balcony")]
    balcony: &'static str,
    #[tabled(rename = "Heritage")]
    heritage: &'static str,
    #[tabled(rename = "Parking")]
    parking: &'static str,
    #[tabled(rename = "Energy")]
    energy: String,
    #[tabled(rename = "Price")]
    price: i64,
}

/// Show the shared feedback dataset
pub async fn list(settings: &Settings, format: OutputFormat) -> Result<()> {
    let store = feedback_store(settings)?;
    let records = store
        .read_all()
        .await
        .with_context(|| format!("reading {}", store.location()))?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            print_heading("Feedback Dataset");
            println!("Location: {}", store.location());
            println!();
            let rows: Vec<FeedbackRow> = records
                .iter()
                .map(|r| {
                    let f = &r.features;
                    FeedbackRow {
                        living_area: format!("{}", f.living_area_m2),
                        rooms: format!("{}", f.room_count),
                        bedrooms: f.bedroom_count,
                        bathrooms: f.bathroom_count,
                        elevator: format_flag(f.has_elevator),
                        balcony: format_flag(f.has_balcony),
                        heritage: format_flag(f.is_heritage_listed),
                        parking: format_flag(f.has_parking),
                        energy: schema::energy_class_letter(f.energy_class)
                            .map(String::from)
                            .unwrap_or_else(|| f.energy_class.to_string()),
                        price: r.price,
                    }
                })
                .collect();
            let total = rows.len();
            print_table(rows);
            println!("\nTotal: {} records", total);
        }
    }
    Ok(())
}
