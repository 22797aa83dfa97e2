use serde::Serialize;

/// Body given to every freshly created note.
pub(crate) const NEW_NOTE_BODY: &str = "# Type your markdown note's title here";

/// A note as mirrored from the remote collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Note {
    pub id: String,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Note {
    pub fn from_doc(id: impl Into<String>, data: NoteData) -> Self {
        Self {
            id: id.into(),
            body: data.body,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Sidebar label: first line of the body, heading markers stripped.
    pub fn title(&self) -> String {
        let first = self.body.lines().next().unwrap_or_default();
        let t = first.trim_start_matches('#').trim();
        if t.is_empty() {
            "Untitled".to_string()
        } else {
            t.to_string()
        }
    }
}

/// Document fields without the store-assigned identifier.
/// Serialized field names are the document's wire names.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NoteData {
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl NoteData {
    pub fn placeholder(now_ms: i64) -> Self {
        Self {
            body: NEW_NOTE_BODY.to_string(),
            created_at: now_ms,
            updated_at: now_ms,
        }
    }
}

/// Partial update for a merge-write. Unset fields are left untouched.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl NotePatch {
    pub fn body(text: impl Into<String>, now_ms: i64) -> Self {
        Self {
            body: Some(text.into()),
            updated_at: Some(now_ms),
        }
    }

    /// Wire names of the fields this patch touches.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut out = Vec::with_capacity(2);
        if self.body.is_some() {
            out.push("body");
        }
        if self.updated_at.is_some() {
            out.push("updatedAt");
        }
        out
    }

    pub fn apply_to(&self, data: &mut NoteData) {
        if let Some(body) = &self.body {
            data.body = body.clone();
        }
        if let Some(ts) = self.updated_at {
            // updatedAt never moves backwards for a given note.
            data.updated_at = data.updated_at.max(ts);
        }
    }
}

/// Most recently modified first. Ties keep collection order.
pub(crate) fn sort_for_display(notes: &mut [Note]) {
    notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}
