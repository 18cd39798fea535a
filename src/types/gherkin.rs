//! Gherkin request/response types

use serde::{Deserialize, Serialize};

/// Body of `POST /generate-gherkin/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStoryRequest {
    pub user_story: String,
}

/// Raw model completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GherkinResponse {
    pub gherkin: String,
}
