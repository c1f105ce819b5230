//! Profile Filter
//!
//! A profile-gated attribute is only part of a view when its profile was
//! requested. An empty request therefore yields the ungated attributes only.

use serde_json::Value;
use tracing::debug;

use crate::compile::inherit::RawItems;
use crate::compile::merge::RawMap;
use crate::compile::{WarningCode, Warnings};
use crate::ident::Identifier;
use crate::schema::{names, Attribute, Attributes, ProfileSet};

/// Whether `attribute` is visible under `profiles`
pub fn is_visible(attribute: &Attribute, profiles: &ProfileSet) -> bool {
    attribute
        .profile
        .as_ref()
        .map_or(true, |profile| profiles.contains(profile))
}

/// Keep attributes with no profile tag or whose profile was requested
pub fn apply_profiles(attributes: &Attributes, profiles: &ProfileSet) -> Attributes {
    attributes
        .iter()
        .filter(|(_, attr)| is_visible(attr, profiles))
        .map(|(name, attr)| (name.clone(), attr.clone()))
        .collect()
}

/// Copy the attributes of every profile an item lists into the item, tagged
/// with the profile, unless the item declares the attribute itself.
pub(crate) fn inject_profiles(items: &mut RawItems, profiles: &RawItems, warnings: &mut Warnings) {
    for (key, item) in items.iter_mut() {
        let listed: Vec<String> = item
            .get(names::PROFILES)
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();

        for name in listed {
            let Some(profile) = lookup_profile(profiles, key, &name) else {
                warnings.push(
                    WarningCode::UndefinedProfile,
                    key.as_str(),
                    format!("profile '{name}' is not defined"),
                );
                continue;
            };
            let profile_attrs = profile.get("attributes").and_then(Value::as_object).cloned().unwrap_or_default();
            let attributes = item
                .entry("attributes")
                .or_insert_with(|| Value::Object(RawMap::new()));
            let Value::Object(attributes) = attributes else { continue };

            let mut injected = 0;
            for (attr_name, attr) in profile_attrs {
                if attributes.contains_key(&attr_name) {
                    continue;
                }
                let mut attr = match attr {
                    Value::Object(map) => map,
                    _ => RawMap::new(),
                };
                attr.insert("profile".into(), Value::String(name.clone()));
                attributes.insert(attr_name, Value::Object(attr));
                injected += 1;
            }
            debug!(item = %key, profile = %name, injected, "Injected profile attributes");
        }
    }
}

fn lookup_profile<'a>(profiles: &'a RawItems, item: &Identifier, name: &str) -> Option<&'a RawMap> {
    profiles.get(name).or_else(|| {
        let ext = item.extension()?;
        profiles.get(Identifier::qualified(ext, name).as_str())
    })
}

/// Union of the declared profiles and the profiles named by attribute tags
pub(crate) fn collect_profiles(declared: &[Identifier], attributes: &Attributes) -> Vec<Identifier> {
    let mut profiles = declared.to_vec();
    for attr in attributes.values() {
        if let Some(profile) = &attr.profile {
            if !profiles.contains(profile) {
                profiles.push(profile.clone());
            }
        }
    }
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs() -> Attributes {
        serde_json::from_value(json!({
            "ip": {"caption": "IP"},
            "hostname": {"caption": "Hostname", "profile": "host"},
            "region": {"caption": "Region", "profile": "cloud"}
        }))
        .unwrap()
    }

    fn set(names: &[&str]) -> ProfileSet {
        names.iter().map(|n| Identifier::new(n)).collect()
    }

    #[test]
    fn test_empty_request_hides_gated_attributes() {
        let filtered = apply_profiles(&attrs(), &ProfileSet::new());
        assert_eq!(filtered.keys().map(Identifier::as_str).collect::<Vec<_>>(), vec!["ip"]);
    }

    #[test]
    fn test_requested_profile_is_visible() {
        let filtered = apply_profiles(&attrs(), &set(&["host"]));
        assert!(filtered.contains_key("hostname"));
        assert!(!filtered.contains_key("region"));
    }

    #[test]
    fn test_filter_is_monotonic() {
        let all = attrs();
        let none = apply_profiles(&all, &ProfileSet::new());
        let host = apply_profiles(&all, &set(&["host"]));
        assert!(none.keys().all(|k| host.contains_key(k)));
        assert!(host.keys().all(|k| all.contains_key(k)));
    }

    #[test]
    fn test_inject_keeps_own_attributes() {
        let mut items: RawItems = [(
            Identifier::new("process_activity"),
            json!({"profiles": ["host", "missing"], "attributes": {"device": {"requirement": "required"}}})
                .as_object()
                .cloned()
                .unwrap(),
        )]
        .into_iter()
        .collect();
        let profiles: RawItems = [(
            Identifier::new("host"),
            json!({"attributes": {"device": {"requirement": "recommended"}, "actor": {}}})
                .as_object()
                .cloned()
                .unwrap(),
        )]
        .into_iter()
        .collect();

        let mut warnings = Warnings::default();
        inject_profiles(&mut items, &profiles, &mut warnings);

        let attributes = &items["process_activity"]["attributes"];
        assert_eq!(attributes["device"], json!({"requirement": "required"}));
        assert_eq!(attributes["actor"], json!({"profile": "host"}));
        assert_eq!(warnings.len(), 1);
    }
}
