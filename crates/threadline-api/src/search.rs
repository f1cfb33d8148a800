use std::collections::HashMap;
use std::hash::Hash;

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use threadline_types::api::{FileSearchResult, PersonSearchResult, SearchResults};
use threadline_types::models::{Message, PresenceStatus, Profile};

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::state::{AppState, with_db};

const MAX_MESSAGES: usize = 5;
const MAX_CHUNKS: usize = 20;
const MAX_FILES: usize = 5;
const MAX_PEOPLE: u32 = 10;
const SIMILARITY_THRESHOLD: f32 = 0.0;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

/// Fuse ranked lists: each key scores `sum 1/(rank+1)` over every position
/// it holds in any list, so a key repeated within one list accumulates too.
/// Output is sorted by score descending; equal scores keep the order in
/// which keys were first seen.
pub fn reciprocal_rank_fusion<K>(lists: &[Vec<K>]) -> Vec<(K, f64)>
where
    K: Eq + Hash + Clone,
{
    let mut order: Vec<K> = Vec::new();
    let mut scores: HashMap<K, f64> = HashMap::new();
    for list in lists {
        for (rank, key) in list.iter().enumerate() {
            let score = 1.0 / (rank as f64 + 1.0);
            match scores.get_mut(key) {
                Some(total) => *total += score,
                None => {
                    scores.insert(key.clone(), score);
                    order.push(key.clone());
                }
            }
        }
    }

    let mut fused: Vec<(K, f64)> = order
        .into_iter()
        .map(|key| {
            let score = scores.get(&key).copied().unwrap_or_default();
            (key, score)
        })
        .collect();
    // sort_by is stable, so first-seen order breaks ties
    fused.sort_by(|a, b| b.1.total_cmp(&a.1));
    fused
}

/// GET /embeddings/search?query=: similar messages, matching files and
/// matching people.
pub async fn search(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::validation("query parameter is required"));
    }

    let embedding = state.embedder.embed(&query).await.map_err(ApiError::Embedding)?;

    let people_query = query.clone();
    let (scored, chunks, name_matches) = with_db(&state, move |db| {
        let mut scored = db.search_messages(&embedding, SIMILARITY_THRESHOLD, MAX_MESSAGES)?;
        for hit in &mut scored {
            hit.record.replies = db.get_replies(hit.record.id)?;
        }
        let chunks = db.search_file_chunks(&embedding, SIMILARITY_THRESHOLD, MAX_CHUNKS)?;
        let name_matches = db.search_profiles(&people_query, MAX_PEOPLE)?;
        Ok((scored, chunks, name_matches))
    })
    .await?;

    let messages: Vec<Message> = scored
        .into_iter()
        .map(|hit| hit.record.into_message())
        .collect();

    // Files: chunks of the same file collapse into one entry
    let chunk_paths: Vec<String> = chunks.iter().map(|c| c.file_path.clone()).collect();
    let fused_files = reciprocal_rank_fusion(&[chunk_paths]);
    let files: Vec<FileSearchResult> = fused_files
        .into_iter()
        .take(MAX_FILES)
        .filter_map(|(path, score)| {
            let chunk = chunks.iter().find(|c| c.file_path == path)?;
            Some(FileSearchResult {
                id: chunk.attachment_id.clone(),
                name: chunk.file_name.clone(),
                file_type: chunk.file_type.clone(),
                shared_by: chunk.shared_by.clone(),
                shared_at: chunk.shared_at,
                file_path: path,
                score,
            })
        })
        .collect();

    // People: name matches and authors of matching messages
    let by_name: Vec<Uuid> = name_matches.iter().map(|p| p.id).collect();
    let mut by_message: Vec<Uuid> = Vec::new();
    for author in messages.iter().filter_map(|m| m.user_id) {
        if !by_message.contains(&author) {
            by_message.push(author);
        }
    }
    let ranked_people: Vec<Uuid> = reciprocal_rank_fusion(&[by_name, by_message])
        .into_iter()
        .map(|(id, _)| id)
        .take(MAX_PEOPLE as usize)
        .collect();

    let lookup = ranked_people.clone();
    let profiles = with_db(&state, move |db| db.get_profiles(&lookup)).await?;
    let now = Utc::now();
    let people: Vec<PersonSearchResult> = ranked_people
        .iter()
        .filter_map(|id| profiles.iter().find(|p| p.id == *id))
        .map(|profile| person_result(profile, now))
        .collect();

    debug!(
        "Search {:?}: {} messages, {} files, {} people",
        query,
        messages.len(),
        files.len(),
        people.len()
    );

    Ok(Json(SearchResults {
        messages,
        files,
        people,
    }))
}

fn person_result(profile: &Profile, now: chrono::DateTime<Utc>) -> PersonSearchResult {
    PersonSearchResult {
        id: profile.id,
        name: profile.username.clone(),
        full_name: profile.full_name.clone(),
        avatar_url: profile.avatar_url.clone(),
        status: PresenceStatus::at(profile.last_seen_at, now),
        title: profile.title.clone(),
        last_seen_at: profile.last_seen_at,
    }
}
