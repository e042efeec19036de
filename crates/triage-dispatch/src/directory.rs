//! # Technician Directory
//!
//! Read-only lookup of rostered technicians. The roster is loaded once at
//! startup from a YAML file and never mutated by the coordinator.
//!
//! ```yaml
//! technicians:
//!   - id: tech-001
//!     name: Dana Reyes
//!     phone: "+1 555 010 0001"
//!     categories: [HVAC, PLUMBING]
//!     onCall: true
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use triage_core::{normalize_phone, Category, Technician, TechnicianId, ValidationError};

/// Lookup of on-call technicians.
pub trait Directory: Send + Sync + 'static {
    /// First on-call technician for `category` not in `excluding`, in
    /// ascending id order.
    fn pick_on_call(
        &self,
        category: Category,
        excluding: &BTreeSet<TechnicianId>,
    ) -> Option<Technician>;

    /// Resolve the sender of an inbound reply. `phone` is normalized
    /// before comparison.
    fn find_by_phone(&self, phone: &str) -> Option<Technician>;

    /// Number of technicians currently on call for `category`.
    fn on_call_count(&self, category: Category) -> usize;

    /// Every rostered technician, in id order.
    fn list(&self) -> Vec<Technician>;
}

/// Errors raised while loading a roster.
#[derive(Error, Debug)]
pub enum RosterError {
    #[error("failed to read roster {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse roster: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid roster entry {id:?}: {source}")]
    InvalidEntry {
        id: String,
        #[source]
        source: ValidationError,
    },

    #[error("duplicate technician id: {0}")]
    DuplicateId(TechnicianId),

    #[error("phone {phone} is shared by {first} and {second}")]
    DuplicatePhone {
        phone: String,
        first: TechnicianId,
        second: TechnicianId,
    },
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    technicians: Vec<RosterEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RosterEntry {
    id: String,
    name: String,
    phone: String,
    categories: Vec<Category>,
    #[serde(default = "default_on_call", alias = "on_call")]
    on_call: bool,
}

fn default_on_call() -> bool {
    true
}

impl RosterEntry {
    fn into_technician(self) -> Result<Technician, RosterError> {
        let invalid = |id: &str, source| RosterError::InvalidEntry {
            id: id.to_string(),
            source,
        };
        let tech_id = TechnicianId::new(self.id.clone()).map_err(|e| invalid(&self.id, e))?;
        Technician::new(
            tech_id,
            self.name,
            &self.phone,
            self.categories,
            self.on_call,
        )
        .map_err(|e| invalid(&self.id, e))
    }
}

/// Roster held in memory, keyed by technician id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    technicians: BTreeMap<TechnicianId, Technician>,
    by_phone: HashMap<String, TechnicianId>,
}

impl InMemoryDirectory {
    /// Build a directory, rejecting duplicate ids and phone numbers.
    pub fn new(technicians: impl IntoIterator<Item = Technician>) -> Result<Self, RosterError> {
        let mut dir = Self::default();
        for tech in technicians {
            if dir.technicians.contains_key(&tech.id) {
                return Err(RosterError::DuplicateId(tech.id));
            }
            if let Some(first) = dir.by_phone.get(&tech.phone) {
                return Err(RosterError::DuplicatePhone {
                    phone: tech.phone.clone(),
                    first: first.clone(),
                    second: tech.id,
                });
            }
            dir.by_phone.insert(tech.phone.clone(), tech.id.clone());
            dir.technicians.insert(tech.id.clone(), tech);
        }
        Ok(dir)
    }

    /// Parse and validate a YAML roster.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RosterError> {
        let file: RosterFile = serde_yaml::from_str(yaml)?;
        let technicians = file
            .technicians
            .into_iter()
            .map(RosterEntry::into_technician)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(technicians)
    }

    /// Read and validate a YAML roster file.
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| RosterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = Self::from_yaml_str(&yaml)?;
        tracing::info!(
            path = %path.display(),
            technicians = dir.technicians.len(),
            "roster loaded"
        );
        Ok(dir)
    }

    pub fn len(&self) -> usize {
        self.technicians.len()
    }

    pub fn is_empty(&self) -> bool {
        self.technicians.is_empty()
    }
}

impl Directory for InMemoryDirectory {
    fn pick_on_call(
        &self,
        category: Category,
        excluding: &BTreeSet<TechnicianId>,
    ) -> Option<Technician> {
        self.technicians
            .values()
            .find(|t| t.serves(category) && !excluding.contains(&t.id))
            .cloned()
    }

    fn find_by_phone(&self, phone: &str) -> Option<Technician> {
        let normalized = normalize_phone(phone).ok()?;
        self.by_phone
            .get(&normalized)
            .and_then(|id| self.technicians.get(id))
            .cloned()
    }

    fn on_call_count(&self, category: Category) -> usize {
        self.technicians
            .values()
            .filter(|t| t.serves(category))
            .count()
    }

    fn list(&self) -> Vec<Technician> {
        self.technicians.values().cloned().collect()
    }
}
