//! Incremental incident ingestion.
//!
//! The incident listing endpoint only offers an inclusive `gte` filter on
//! `modification_time`; there is no exclusive bound or continuation
//! token. Polling therefore keeps a [`Cursor`]: the highest modification
//! time seen so far plus the IDs of every incident seen *at exactly that
//! time*. On the next poll, incidents sitting on the boundary timestamp
//! whose IDs are already in the cursor are dropped, so ties are neither
//! lost nor emitted twice.
//!
//! One poll is one state transition:
//!
//! 1. Search `modification_time gte cursor.last_fetch_time`, ascending,
//!    one page of `page_size`.
//! 2. Drop boundary incidents already in `cursor.last_fetch_ids`; emit the
//!    rest in ascending modification-time order (ties keep response order).
//! 3. Advance `last_fetch_time` to the newest emitted modification time
//!    (never backwards) and collect, from the whole page, the IDs sitting
//!    on that new boundary.
//!
//! [`advance`] is the pure transition; [`fetch_incidents`] adds the HTTP
//! call. A failed request returns an error and leaves the caller's cursor
//! as it was. Persisting the cursor between runs is up to the caller;
//! [`Cursor::load`] and [`Cursor::save`] provide a JSON file store.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::args::{RelativeTime, TimeUnit, format_millis};
use crate::client::XdrClient;
use crate::error::{Result, XdrError};
use crate::incidents::search_incidents;
use crate::request::{SearchRequest, SortOrder};

/// Polling checkpoint carried from one poll to the next.
///
/// Invariant: every ID in `last_fetch_ids` belongs to an incident whose
/// modification time equals `last_fetch_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Epoch milliseconds; the inclusive lower bound of the next search.
    pub last_fetch_time: i64,
    /// Incidents already emitted at `last_fetch_time`.
    #[serde(default)]
    pub last_fetch_ids: BTreeSet<String>,
}

impl Cursor {
    /// A cursor at `last_fetch_time` with no boundary IDs.
    pub fn starting_at(last_fetch_time: i64) -> Self {
        Cursor {
            last_fetch_time,
            last_fetch_ids: BTreeSet::new(),
        }
    }

    /// The first-run cursor: `first_fetch_window` before `now`.
    pub fn initial(config: &FetchConfig, now: DateTime<Utc>) -> Result<Self> {
        let start = config.first_fetch_window.before(now).ok_or_else(|| {
            XdrError::validation(
                "first_fetch",
                format!("`{}` reaches before the supported time range", config.first_fetch_window),
            )
        })?;
        Ok(Cursor::starting_at(start.timestamp_millis()))
    }

    /// Reads a cursor previously written by [`Cursor::save`]. A missing
    /// file means "first run" and yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(XdrError::State {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes the cursor as JSON, replacing any previous state.
    ///
    /// The JSON goes to a temporary file next to `path` that is then
    /// renamed over it, so an interrupted save leaves the old state intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        let state_error = |source| XdrError::State {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir).map_err(state_error)?;
        staged.write_all(text.as_bytes()).map_err(state_error)?;
        staged.as_file().sync_all().map_err(state_error)?;
        staged
            .persist(path)
            .map_err(|e| state_error(e.error))?;
        Ok(())
    }
}

/// Poller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// How far back the very first poll reaches.
    pub first_fetch_window: RelativeTime,
    /// Maximum incidents requested per poll.
    pub page_size: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            first_fetch_window: RelativeTime::new(3, TimeUnit::Day),
            page_size: 50,
        }
    }
}

/// An incident handed to the ingestion host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestedIncident {
    pub id: String,
    /// `#{incident_id} - {description}`.
    pub name: String,
    /// Creation time as `%Y-%m-%dT%H:%M:%SZ`, when the API reports one.
    pub occurred: Option<String>,
    /// The incident object exactly as the API returned it.
    pub raw_payload: Value,
}

/// The fields the poller reads from each incident; everything else stays
/// in the raw payload.
#[derive(Debug, Deserialize)]
struct IncidentStamp {
    incident_id: String,
    modification_time: i64,
    #[serde(default)]
    creation_time: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

impl IncidentStamp {
    fn ingest(self, raw_payload: Value) -> IngestedIncident {
        let name = match self.description.as_deref() {
            Some(description) if !description.is_empty() => {
                format!("#{} - {description}", self.incident_id)
            }
            _ => format!("#{}", self.incident_id),
        };
        IngestedIncident {
            occurred: self.creation_time.and_then(format_millis),
            id: self.incident_id,
            name,
            raw_payload,
        }
    }
}

/// The search one poll sends for `cursor`.
pub fn poll_request(cursor: &Cursor, page_size: u32) -> SearchRequest {
    SearchRequest::page(0, page_size)
        .filter_gte("modification_time", Some(cursor.last_fetch_time))
        .sorted_by("modification_time", SortOrder::Asc)
}

/// Applies one fetched page to `cursor`.
///
/// Returns the incidents to emit, oldest first, and the cursor for the
/// next poll. An empty page returns the cursor unchanged.
pub fn advance(cursor: &Cursor, page: Vec<Value>) -> Result<(Vec<IngestedIncident>, Cursor)> {
    if page.is_empty() {
        return Ok((Vec::new(), cursor.clone()));
    }

    let mut stamped = Vec::with_capacity(page.len());
    for raw in page {
        let stamp: IncidentStamp = serde_json::from_value(raw.clone())?;
        stamped.push((stamp, raw));
    }

    let mut new_time = cursor.last_fetch_time;
    let mut emitted = Vec::new();
    let mut seen_ids = Vec::with_capacity(stamped.len());
    for (stamp, raw) in stamped {
        seen_ids.push((stamp.incident_id.clone(), stamp.modification_time));

        let already_emitted = stamp.modification_time == cursor.last_fetch_time
            && cursor.last_fetch_ids.contains(&stamp.incident_id);
        if already_emitted {
            debug!(incident_id = %stamp.incident_id, "skipping incident emitted by previous poll");
            continue;
        }
        new_time = new_time.max(stamp.modification_time);
        emitted.push((stamp.modification_time, stamp.ingest(raw)));
    }

    // Stable: ties keep response order.
    emitted.sort_by_key(|(modified, _)| *modified);

    let last_fetch_ids = seen_ids
        .into_iter()
        .filter(|(_, modified)| *modified == new_time)
        .map(|(id, _)| id)
        .collect();

    let next = Cursor {
        last_fetch_time: new_time,
        last_fetch_ids,
    };
    Ok((emitted.into_iter().map(|(_, incident)| incident).collect(), next))
}

/// Polls once: fetches the page after `previous` (or the first-run window
/// when there is no previous cursor) and returns the new incidents with
/// the advanced cursor.
pub async fn fetch_incidents(
    client: &XdrClient,
    config: &FetchConfig,
    previous: Option<&Cursor>,
    now: DateTime<Utc>,
) -> Result<(Vec<IngestedIncident>, Cursor)> {
    let cursor = match previous {
        Some(cursor) => cursor.clone(),
        None => Cursor::initial(config, now)?,
    };

    let (list, _) = search_incidents(client, &poll_request(&cursor, config.page_size)).await?;
    let fetched = list.incidents.len();
    let (incidents, next) = advance(&cursor, list.incidents)?;

    info!(
        fetched,
        emitted = incidents.len(),
        last_fetch_time = next.last_fetch_time,
        boundary_ids = next.last_fetch_ids.len(),
        "incident poll completed"
    );
    Ok((incidents, next))
}

/// Connectivity check: fetches a single incident. Returns `"ok"` when the
/// credentials and URL work.
pub async fn test_module(client: &XdrClient) -> Result<String> {
    search_incidents(client, &SearchRequest::page(0, 1)).await?;
    Ok("ok".to_string())
}
