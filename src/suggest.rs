//! Relationship suggestions from free text.
//!
//! An external text-analysis service turns a guest's free-text survey answer
//! into proposed relationships. Proposals get no special trust: each one is
//! resolved against the guest list and then validated like any manual edit.
//!
//! ## Implementations
//!
//! - [`HttpSuggester`] - POSTs `{ event_id, responses: { guestId, text } }` to
//!   `{base}/analyze_survey` and reads `suggestedRelationships`

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::arrangement::EventId;
use crate::graph::{Guest, GuestGraph, GuestId, RelationshipType};

/// One relationship proposed by the analysis service.
///
/// The target is named by id or, failing that, by display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedRelationship {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<GuestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    /// Falls back to the type's default strength
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SuggestionOutcome {
    Applied {
        other: GuestId,
        #[serde(rename = "type")]
        kind: RelationshipType,
        strength: f64,
    },
    Rejected {
        suggestion: SuggestedRelationship,
        reason: String,
    },
}

/// Text-analysis collaborator.
#[async_trait]
pub trait RelationshipSuggester: Send + Sync {
    /// Propose relationships for `guest` from `text`. `guests` is the full
    /// guest list, for services that match names themselves.
    async fn suggest(
        &self,
        event_id: EventId,
        guest: &Guest,
        text: &str,
        guests: &[Guest],
    ) -> Result<Vec<SuggestedRelationship>>;
}

/// Resolve a suggestion's target against the graph.
///
/// Ids win over names; names match case-insensitively and must be unambiguous.
pub fn resolve_target(
    suggestion: &SuggestedRelationship,
    graph: &GuestGraph,
) -> Result<GuestId, String> {
    if let Some(id) = suggestion.guest_id {
        return if graph.contains(id) {
            Ok(id)
        } else {
            Err(format!("unknown guest {}", id))
        };
    }
    let Some(name) = suggestion.guest_name.as_deref().map(str::trim) else {
        return Err("suggestion names no guest".into());
    };
    let matches: Vec<GuestId> = graph
        .guests()
        .filter(|g| g.name.eq_ignore_ascii_case(name))
        .map(|g| g.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(format!("no guest named '{}'", name)),
        _ => Err(format!("'{}' matches {} guests", name, matches.len())),
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    event_id: EventId,
    responses: SurveyResponse<'a>,
    guests: Vec<GuestRef<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SurveyResponse<'a> {
    guest_id: GuestId,
    text: &'a str,
}

#[derive(Serialize)]
struct GuestRef<'a> {
    id: GuestId,
    name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    #[serde(default)]
    suggested_relationships: Vec<SuggestedRelationship>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

/// Client for an `analyze_survey` HTTP endpoint.
pub struct HttpSuggester {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpSuggester {
    /// `base_url` is the service root; `/analyze_survey` is appended.
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client for suggestion service")?;
        Ok(Self {
            client,
            url: format!("{}/analyze_survey", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RelationshipSuggester for HttpSuggester {
    async fn suggest(
        &self,
        event_id: EventId,
        guest: &Guest,
        text: &str,
        guests: &[Guest],
    ) -> Result<Vec<SuggestedRelationship>> {
        let body = AnalyzeRequest {
            event_id,
            responses: SurveyResponse {
                guest_id: guest.id,
                text,
            },
            guests: guests
                .iter()
                .filter(|g| g.id != guest.id)
                .map(|g| GuestRef {
                    id: g.id,
                    name: &g.name,
                })
                .collect(),
        };

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to connect to suggestion service at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(ErrorResponse { message: Some(message) }) = serde_json::from_str(&body) {
                anyhow::bail!("Suggestion service error ({}): {}", status.as_u16(), message);
            }
            anyhow::bail!("Suggestion service returned {}: {}", status.as_u16(), body);
        }

        let parsed: AnalyzeResponse = response
            .json()
            .await
            .context("Failed to parse suggestion service response")?;
        Ok(parsed.suggested_relationships)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn graph_with(names: &[&str]) -> (GuestGraph, Vec<Guest>) {
        let mut graph = GuestGraph::new();
        let guests: Vec<Guest> = names.iter().map(|n| Guest::new(*n, "Friends")).collect();
        for g in &guests {
            graph.add_guest(g.clone()).unwrap();
        }
        (graph, guests)
    }

    fn by_name(name: &str) -> SuggestedRelationship {
        SuggestedRelationship {
            guest_id: None,
            guest_name: Some(name.into()),
            kind: RelationshipType::Friend,
            strength: None,
        }
    }

    #[test]
    fn test_resolve_prefers_id_then_name() {
        let (graph, guests) = graph_with(&["Ada", "Grace"]);
        let mut s = by_name("Ada");
        s.guest_id = Some(guests[1].id);
        assert_eq!(resolve_target(&s, &graph), Ok(guests[1].id));

        assert_eq!(resolve_target(&by_name(" grace "), &graph), Ok(guests[1].id));
    }

    #[test]
    fn test_resolve_rejects_unknown_and_ambiguous() {
        let (graph, _) = graph_with(&["Sam", "sam", "Alex"]);
        assert!(resolve_target(&by_name("Sam"), &graph)
            .unwrap_err()
            .contains("matches 2 guests"));
        assert!(resolve_target(&by_name("Jordan"), &graph)
            .unwrap_err()
            .contains("no guest named"));

        let mut s = by_name("Alex");
        s.guest_id = Some(Uuid::new_v4());
        assert!(resolve_target(&s, &graph).unwrap_err().contains("unknown guest"));

        s.guest_id = None;
        s.guest_name = None;
        assert!(resolve_target(&s, &graph).is_err());
    }

    #[tokio::test]
    async fn test_http_suggester_posts_survey_and_parses() {
        let server = MockServer::start().await;
        let (_, guests) = graph_with(&["Ada", "Grace"]);
        let event_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/api/analyze_survey"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "event_id": event_id,
                "responses": { "guestId": guests[0].id, "text": "Grace is my sister" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "suggestedRelationships": [
                    { "guestId": guests[1].id, "type": "family", "strength": 0.9 },
                    { "guestName": "Grace", "type": "friend" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let suggester =
            HttpSuggester::new(&format!("{}/api/", server.uri()), Some("secret".into()), 5).unwrap();
        let suggestions = suggester
            .suggest(event_id, &guests[0], "Grace is my sister", &guests)
            .await
            .unwrap();

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].guest_id, Some(guests[1].id));
        assert_eq!(suggestions[0].kind, RelationshipType::Family);
        assert_eq!(suggestions[0].strength, Some(0.9));
        assert_eq!(suggestions[1].guest_name.as_deref(), Some("Grace"));
        assert_eq!(suggestions[1].strength, None);
    }

    #[tokio::test]
    async fn test_http_suggester_surfaces_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze_survey"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(serde_json::json!({ "message": "text too short" })),
            )
            .mount(&server)
            .await;

        let (_, guests) = graph_with(&["Ada"]);
        let suggester = HttpSuggester::new(&server.uri(), None, 5).unwrap();
        let err = suggester
            .suggest(Uuid::new_v4(), &guests[0], "hi", &guests)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("422"), "{}", msg);
        assert!(msg.contains("text too short"), "{}", msg);
    }

    #[tokio::test]
    async fn test_http_suggester_missing_list_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze_survey"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let (_, guests) = graph_with(&["Ada"]);
        let suggester = HttpSuggester::new(&server.uri(), None, 5).unwrap();
        let suggestions = suggester
            .suggest(Uuid::new_v4(), &guests[0], "nobody", &guests)
            .await
            .unwrap();
        assert!(suggestions.is_empty());
    }
}
