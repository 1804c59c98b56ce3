use crate::domain::adoption::Adoption;
use crate::domain::project::Project;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct ProjectRow {
    id: String,
    owner: String,
    title: String,
    goal_amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct AdoptionRow {
    id: String,
    sponsor: String,
    recipient: String,
}

/// Reads downstream aggregates (projects, adoptions) from CSV sources.
///
/// Rows are trimmed and deserialized lazily; a bad row yields an error item
/// and does not stop the stream.
pub struct SeedReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SeedReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Expects the header `id,owner,title,goal_amount`.
    pub fn projects(self) -> impl Iterator<Item = Result<Project>> {
        self.reader
            .into_deserialize::<ProjectRow>()
            .map(|result| {
                let row = result.map_err(PaymentError::from)?;
                Project::new(row.id, row.owner, row.title, row.goal_amount)
            })
    }

    /// Expects the header `id,sponsor,recipient`.
    pub fn adoptions(self) -> impl Iterator<Item = Result<Adoption>> {
        self.reader.into_deserialize::<AdoptionRow>().map(|result| {
            result
                .map(|row| Adoption::new(row.id, row.sponsor, row.recipient))
                .map_err(PaymentError::from)
        })
    }
}
