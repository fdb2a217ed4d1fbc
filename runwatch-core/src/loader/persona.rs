// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{PersonaDirectoryError, PersonaLookupError},
    record::RunRecord,
};
use camino::Utf8Path;
use runwatch_metadata::{PersonaId, WirePersona};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Display fields for a persona.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PersonaDisplay {
    /// The display name.
    pub name: String,
    /// The avatar URL.
    pub avatar_url: Option<String>,
}

/// A read-only persona cache keyed by id.
///
/// Lookups are best-effort enrichment: callers degrade to the bare id when a
/// persona is missing or the lookup fails.
pub trait PersonaLookup {
    /// Looks up a persona.
    fn persona(&self, id: &PersonaId) -> Result<Option<PersonaDisplay>, PersonaLookupError>;
}

/// An in-memory persona cache.
#[derive(Clone, Debug, Default)]
pub struct PersonaDirectory {
    personas: HashMap<PersonaId, PersonaDisplay>,
}

impl PersonaDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory from wire personas.
    pub fn from_personas(personas: impl IntoIterator<Item = WirePersona>) -> Self {
        let mut directory = Self::new();
        for persona in personas {
            directory.insert(persona);
        }
        directory
    }

    /// Loads a directory from a JSON file containing an array of personas.
    pub async fn load(path: &Utf8Path) -> Result<Self, PersonaDirectoryError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|error| PersonaDirectoryError::Read {
                    path: path.to_owned(),
                    error,
                })?;
        let personas: Vec<WirePersona> =
            serde_json::from_str(&contents).map_err(|error| PersonaDirectoryError::Parse {
                path: path.to_owned(),
                error,
            })?;
        debug!(count = personas.len(), %path, "loaded persona directory");
        Ok(Self::from_personas(personas))
    }

    /// Adds or replaces a persona.
    pub fn insert(&mut self, persona: WirePersona) {
        self.personas.insert(
            persona.id,
            PersonaDisplay {
                name: persona.name,
                avatar_url: persona.avatar_url,
            },
        );
    }

    /// Returns the number of personas.
    pub fn len(&self) -> usize {
        self.personas.len()
    }

    /// Returns true if the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

impl PersonaLookup for PersonaDirectory {
    fn persona(&self, id: &PersonaId) -> Result<Option<PersonaDisplay>, PersonaLookupError> {
        Ok(self.personas.get(id).cloned())
    }
}

/// Fills in missing persona display fields from a lookup.
///
/// Never fails: lookup errors are logged and the record keeps its bare
/// persona id. Returns true if the record changed.
pub fn enrich_persona(record: &mut RunRecord, lookup: &dyn PersonaLookup) -> bool {
    if record.persona_name.is_some() {
        return false;
    }
    let Some(persona_id) = &record.persona_id else {
        return false;
    };

    match lookup.persona(persona_id) {
        Ok(Some(display)) => {
            record.persona_name = Some(display.name);
            if record.persona_avatar_url.is_none() {
                record.persona_avatar_url = display.avatar_url;
            }
            true
        }
        Ok(None) => {
            debug!(run = %record.id(), persona = %persona_id, "persona not in cache");
            false
        }
        Err(error) => {
            warn!(run = %record.id(), persona = %persona_id, %error, "persona lookup failed");
            false
        }
    }
}
