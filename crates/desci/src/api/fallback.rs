//! Fallback data for when the chain cannot answer.
//!
//! The mock catalog enriches chain records that share its ids and stands in
//! for them entirely when the chain is down. Development servers also answer
//! failed writes with simulated receipts.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::{ExperimentStatus, Receipt};
use crate::units::{Address, TxHash, Wei};

use super::views::{DataSource, ExperimentDetails, ExperimentView};

static CATALOG: LazyLock<Vec<ExperimentView>> = LazyLock::new(build_catalog);

struct Entry {
    id: u64,
    title: &'static str,
    description: &'static str,
    category: &'static str,
    goal: u64,
    raised: Wei,
    backers: usize,
    days_left: i64,
    details: [&'static str; 3],
    tags: &'static [&'static str],
}

fn build_catalog() -> Vec<ExperimentView> {
    let entries = [
        Entry {
            id: 1,
            title: "Quantum Computing for Drug Discovery",
            description: "Using quantum algorithms to speed up the search for drug candidates",
            category: "Quantum Computing",
            goal: 50,
            raised: Wei::new(32_500_000_000_000_000_000),
            backers: 78,
            days_left: 15,
            details: [
                "Quantum simulation of protein-ligand binding to cut screening time.",
                "Variational quantum circuits combined with classical ML post-processing.",
                "An order-of-magnitude faster discovery pipeline with better binding predictions.",
            ],
            tags: &["quantum computing", "drug discovery", "machine learning"],
        },
        Entry {
            id: 2,
            title: "CRISPR Off-Target Atlas",
            description: "Mapping off-target edits of common guide RNAs across cell lines",
            category: "Genomics",
            goal: 20,
            raised: Wei::from_ether(20),
            backers: 120,
            days_left: 0,
            details: [
                "A public atlas of off-target edits for the 500 most used guides.",
                "GUIDE-seq on six cell lines, with reads published as open datasets.",
                "Safer guide selection for therapeutic editing.",
            ],
            tags: &["crispr", "genomics", "open data"],
        },
        Entry {
            id: 3,
            title: "Deep-Sea Microbiome Survey",
            description: "Sequencing microbial communities around hydrothermal vents",
            category: "Marine Biology",
            goal: 35,
            raised: Wei::new(8_750_000_000_000_000_000),
            backers: 23,
            days_left: 40,
            details: [
                "Metagenomic sampling at three vent fields in the Pacific.",
                "ROV sampling followed by long-read sequencing and assembly.",
                "New enzymes for industrial catalysis and a reference genome set.",
            ],
            tags: &["microbiome", "oceanography", "metagenomics"],
        },
    ];

    entries.into_iter().map(Entry::into_view).collect()
}

impl Entry {
    fn into_view(self) -> ExperimentView {
        let goal = Wei::from_ether(self.goal);
        let funded = self.raised >= goal;
        let progress = self.raised.as_u128().saturating_mul(100) / goal.as_u128();
        let [overview, methodology, impact] = self.details;

        ExperimentView {
            id: self.id,
            title: self.title.to_string(),
            description: self.description.to_string(),
            category: Some(self.category.to_string()),
            researcher: None,
            funding_goal: goal.format_ether(),
            funding_raised: self.raised.format_ether(),
            backers: self.backers,
            days_left: self.days_left,
            progress: u8::try_from(progress.min(100)).unwrap_or(100),
            status: if funded {
                ExperimentStatus::Funded
            } else {
                ExperimentStatus::Funding
            },
            funding_complete: funded,
            deadline: None,
            contract_address: None,
            details: Some(ExperimentDetails {
                overview: overview.to_string(),
                methodology: methodology.to_string(),
                impact: impact.to_string(),
            }),
            tags: self.tags.iter().map(ToString::to_string).collect(),
            source: DataSource::Mock,
        }
    }
}

/// The whole mock catalog.
#[must_use]
pub fn catalog() -> Vec<ExperimentView> {
    CATALOG.clone()
}

/// The catalog entry with this id.
#[must_use]
pub fn catalog_entry(id: u64) -> Option<ExperimentView> {
    CATALOG.iter().find(|entry| entry.id == id).cloned()
}

/// Merge a chain record with the catalog entry of the same id, if any.
#[must_use]
pub fn enrich(chain: ExperimentView) -> ExperimentView {
    match catalog_entry(chain.id) {
        Some(entry) => entry.merged_with(chain),
        None => chain,
    }
}

/// A receipt for a call that never reached the chain.
///
/// The hash covers the sender, the method and the current time, so repeated
/// simulations do not collide. The block number is always 0.
#[must_use]
pub fn simulated_receipt(method: &str, from: &Address, now: DateTime<Utc>) -> Receipt {
    let stamp = now.to_rfc3339_opts(SecondsFormat::Nanos, true);
    Receipt {
        tx_hash: TxHash::compute(0, from, method, &stamp),
        block_number: 0,
        method: method.to_string(),
    }
}
