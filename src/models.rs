use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use url::Url;
use utoipa::ToSchema;

static DEFAULT_EVENT_DETAILS: Lazy<EventDetails> = Lazy::new(|| EventDetails {
    date: "APRIL 19TH".into(),
    time: "11:30 AM".into(),
    price: "99".into(),
    original_price: "199".into(),
    location: "Live on Zoom".into(),
    duration: "3-Hour Comprehensive Session".into(),
    discount_percentage: "50%".into(),
});

static DEFAULT_COACHES: Lazy<Vec<Coach>> = Lazy::new(|| {
    vec![
        Coach {
            name: "Inspiring Shereen".into(),
            title: "Life Coach".into(),
            description: "Shaping Lives With Holistic Success".into(),
            bio: "With over 10 years of experience in transformational coaching, Shereen has helped hundreds of professionals reclaim their purpose and passion.".into(),
            expertise: vec![
                "Personal Development".into(),
                "Life Transformation".into(),
                "Mindfulness Training".into(),
            ],
            image: None,
        },
        Coach {
            name: "Sikander Tuteja".into(),
            title: "Holistic Success Coach".into(),
            description: "Expert in business growth and personal development".into(),
            bio: "A seasoned entrepreneur and mindset coach, Sikander specializes in helping professionals align their career goals with their core values.".into(),
            expertise: vec![
                "Business Strategy".into(),
                "Wealth Creation".into(),
                "Leadership Development".into(),
            ],
            image: None,
        },
    ]
});

/// Persisted event record stored under `content/eventDetails`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    #[schema(example = "APRIL 19TH")]
    pub date: String,
    #[schema(example = "11:30 AM")]
    pub time: String,
    #[serde(deserialize_with = "string_or_number")]
    #[schema(example = "99")]
    pub price: String,
    #[serde(deserialize_with = "string_or_number")]
    #[schema(example = "199")]
    pub original_price: String,
    pub location: String,
    pub duration: String,
    #[schema(example = "50%")]
    pub discount_percentage: String,
}

impl Default for EventDetails {
    fn default() -> Self {
        DEFAULT_EVENT_DETAILS.clone()
    }
}

impl EventDetails {
    /// Overlays the fields present in `patch`, keeping the current value for
    /// every field that is absent or blank.
    pub fn merge(&mut self, patch: &EventDetailsPatch) {
        overlay(&mut self.date, &patch.date);
        overlay(&mut self.time, &patch.time);
        overlay(&mut self.price, &patch.price);
        overlay(&mut self.original_price, &patch.original_price);
        overlay(&mut self.location, &patch.location);
        overlay(&mut self.duration, &patch.duration);
        overlay(&mut self.discount_percentage, &patch.discount_percentage);
    }

    pub fn to_patch(&self) -> EventDetailsPatch {
        EventDetailsPatch {
            date: Some(self.date.clone()),
            time: Some(self.time.clone()),
            price: Some(self.price.clone()),
            original_price: Some(self.original_price.clone()),
            location: Some(self.location.clone()),
            duration: Some(self.duration.clone()),
            discount_percentage: Some(self.discount_percentage.clone()),
        }
    }
}

fn overlay(target: &mut String, value: &Option<String>) {
    if let Some(value) = non_blank(value) {
        *target = value.to_string();
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Subset of persisted event fields. Serializes to exactly the merge-write
/// payload: absent fields are omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventDetailsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_string_or_number"
    )]
    pub price: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_string_or_number"
    )]
    pub original_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<String>,
}

impl EventDetailsPatch {
    /// Field map sent to the remote store as a merge-write.
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        }
    }
}

/// Uncommitted edit values held while the edit dialog is open. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventDetailsDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<String>,
}

impl EventDetailsDraft {
    /// Resolves the draft against `current`: a present, non-blank draft value
    /// wins, otherwise the current value is kept.
    pub fn commit(&self, current: &EventDetails) -> EventDetails {
        let mut committed = current.clone();
        committed.merge(&self.as_patch());
        committed
    }

    /// Later values win field by field.
    pub fn absorb(&mut self, other: &EventDetailsDraft) {
        let pairs = [
            (&mut self.date, &other.date),
            (&mut self.time, &other.time),
            (&mut self.price, &other.price),
            (&mut self.original_price, &other.original_price),
            (&mut self.location, &other.location),
            (&mut self.duration, &other.duration),
            (&mut self.discount_percentage, &other.discount_percentage),
        ];
        for (target, value) in pairs {
            if value.is_some() {
                target.clone_from(value);
            }
        }
    }

    fn as_patch(&self) -> EventDetailsPatch {
        EventDetailsPatch {
            date: self.date.clone(),
            time: self.time.clone(),
            price: self.price.clone(),
            original_price: self.original_price.clone(),
            location: self.location.clone(),
            duration: self.duration.clone(),
            discount_percentage: self.discount_percentage.clone(),
        }
    }
}

/// Input of an event-details update.
///
/// Persisted fields sit at the top level next to `isEditing`; draft values
/// travel in their own `draft` object and never reach the remote store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventDetailsUpdate {
    #[serde(flatten)]
    pub fields: EventDetailsPatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<EventDetailsDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_editing: Option<bool>,
}

impl EventDetailsUpdate {
    pub fn fields(fields: EventDetailsPatch) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn draft(draft: EventDetailsDraft) -> Self {
        Self {
            draft: Some(draft),
            ..Self::default()
        }
    }

    /// Save-and-close update built from the draft the edit dialog holds.
    pub fn commit(draft: &EventDetailsDraft, current: &EventDetails) -> Self {
        Self::fields(draft.commit(current).to_patch()).close_editing()
    }

    pub fn close_editing(mut self) -> Self {
        self.is_editing = Some(false);
        self
    }

    /// Only an explicit `isEditing: false` persists the update.
    pub fn closes_editing(&self) -> bool {
        self.is_editing == Some(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(default)]
pub struct Coach {
    pub name: String,
    pub title: String,
    pub description: String,
    pub bio: String,
    pub expertise: Vec<String>,
    #[serde(deserialize_with = "optional_url")]
    #[schema(value_type = Option<String>, format = "uri")]
    pub image: Option<Url>,
}

pub fn default_coaches() -> Vec<Arc<Coach>> {
    DEFAULT_COACHES.iter().cloned().map(Arc::new).collect()
}

/// One-shot toast. Only one is live at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Notification {
    pub visible: bool,
    pub message: String,
}

/// Read model handed to UI consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentView {
    pub event_details: EventDetails,
    pub is_editing: bool,
    pub draft: EventDetailsDraft,
    /// Positions match `content/coaches/{index}`; holes are `null`.
    pub coaches: Vec<Option<Coach>>,
    pub is_editing_coaches: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub show_toast: bool,
    pub toast_message: String,
    pub can_edit: bool,
}

/// Body of `content` as written by the bootstrap.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDocument<'a> {
    pub event_details: &'a EventDetails,
    pub coaches: Vec<Option<&'a Coach>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub reference_id: String,
    pub app_id: String,
    pub session_token: String,
    pub sdk_url: String,
    pub components: Vec<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Blank or unparsable image links are treated as "no image".
fn optional_url<'de, D>(deserializer: D) -> Result<Option<Url>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match Url::parse(raw) {
        Ok(url) => Ok(Some(url)),
        Err(err) => {
            warn!(image = raw, error = %err, "dropping unparsable coach image link");
            Ok(None)
        }
    }
}
