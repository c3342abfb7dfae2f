//! Teacher authoring form: pick topic / location / objective and supply the key.

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, OTHER};
use crate::domain::QuestContext;
use crate::error::FormError;

/// Raw form input. Selections equal to `"Other"` defer to the matching custom field.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthoringForm {
  pub api_key: String,
  pub topic: String,
  pub custom_topic: String,
  pub location: String,
  pub custom_location: String,
  pub objective: String,
  pub custom_objective: String,
}

fn pick<'a>(selected: &'a str, custom: &'a str) -> &'a str {
  if selected == OTHER { custom.trim() } else { selected.trim() }
}

impl AuthoringForm {
  /// Form prefilled with the first topic, its first objective and the default location.
  pub fn with_defaults(catalog: &Catalog, api_key: Option<&str>) -> Self {
    let topic = catalog.default_topic().to_string();
    let objective = catalog.objectives_for(&topic).first().cloned().unwrap_or_default();
    Self {
      api_key: api_key.unwrap_or_default().to_string(),
      topic,
      location: catalog.default_location().to_string(),
      objective,
      ..Self::default()
    }
  }

  /// Validate in display order and produce the credential plus the generation context.
  pub fn resolve(&self) -> Result<(String, QuestContext), FormError> {
    let api_key = self.api_key.trim();
    if api_key.is_empty() {
      return Err(FormError::MissingCredential);
    }
    let topic = pick(&self.topic, &self.custom_topic);
    if topic.is_empty() {
      return Err(FormError::MissingTopic);
    }
    let location = pick(&self.location, &self.custom_location);
    if location.is_empty() {
      return Err(FormError::MissingLocation);
    }
    // A custom topic has no catalog objectives, so the objective must be typed.
    let objective = if self.topic == OTHER {
      self.custom_objective.trim()
    } else {
      pick(&self.objective, &self.custom_objective)
    };
    if objective.is_empty() {
      return Err(FormError::MissingObjective);
    }
    Ok((
      api_key.to_string(),
      QuestContext {
        topic: topic.to_string(),
        location: location.to_string(),
        objective: objective.to_string(),
      },
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn filled() -> AuthoringForm {
    let cat = Catalog::builtin();
    AuthoringForm::with_defaults(&cat, Some("key-123"))
  }

  #[test]
  fn defaults_resolve_to_catalog_entries() {
    let cat = Catalog::builtin();
    let (key, ctx) = filled().resolve().expect("valid");
    assert_eq!(key, "key-123");
    assert_eq!(ctx.topic, cat.default_topic());
    assert_eq!(ctx.location, "Ngoài sân trường");
    assert_eq!(ctx.objective, cat.objectives_for(&ctx.topic)[0]);
  }

  #[test]
  fn errors_come_in_display_order() {
    let cat = Catalog::builtin();
    let empty = AuthoringForm::default();
    assert_eq!(empty.resolve(), Err(FormError::MissingCredential));

    let mut f = AuthoringForm { api_key: "  k ".into(), topic: OTHER.into(), ..Default::default() };
    assert_eq!(f.resolve(), Err(FormError::MissingTopic));
    f.custom_topic = "Hình học vui".into();
    assert_eq!(f.resolve(), Err(FormError::MissingLocation));
    f.location = OTHER.into();
    f.custom_location = "   ".into();
    assert_eq!(f.resolve(), Err(FormError::MissingLocation));
    f.custom_location = "Sân bóng".into();
    f.objective = cat.objectives_for(cat.default_topic())[0].clone();
    assert_eq!(f.resolve(), Err(FormError::MissingObjective));
    f.custom_objective = " Đo chu vi sân ".into();
    let (key, ctx) = f.resolve().expect("valid");
    assert_eq!(key, "k");
    assert_eq!(ctx, QuestContext {
      topic: "Hình học vui".into(),
      location: "Sân bóng".into(),
      objective: "Đo chu vi sân".into(),
    });
  }

  #[test]
  fn other_objective_uses_custom_text() {
    let mut f = filled();
    f.objective = OTHER.into();
    assert_eq!(f.resolve(), Err(FormError::MissingObjective));
    f.custom_objective = "Ước lượng chiều cao".into();
    assert_eq!(f.resolve().expect("valid").1.objective, "Ước lượng chiều cao");
  }

  #[test]
  fn form_accepts_camel_case_input() {
    let f: AuthoringForm = serde_json::from_str(
      r#"{"apiKey":"k","topic":"Other","customTopic":"T","location":"L","customObjective":"O"}"#,
    ).expect("parse");
    let (_, ctx) = f.resolve().expect("valid");
    assert_eq!(ctx.topic, "T");
    assert_eq!(ctx.objective, "O");
  }
}
