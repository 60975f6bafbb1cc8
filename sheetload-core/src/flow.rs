//! Scripted request flow a VU walks through on every iteration.
//!
//! A [`Flow`] is an ordered list of named [`Group`]s, each an ordered list of [`Step`]s. Every
//! step is one HTTP call plus the checks applied to its response.

use http::Method;
use serde_json::Value;

/// Expected JSON shape of a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyShape {
    JsonArray,
    JsonObject,
    JsonObjectWithKey(String),
}

impl BodyShape {
    pub fn matches(&self, body: &[u8]) -> bool {
        let Ok(value) = serde_json::from_slice::<Value>(body) else {
            return false;
        };
        match self {
            Self::JsonArray => value.is_array(),
            Self::JsonObject => value.is_object(),
            Self::JsonObjectWithKey(key) => value.as_object().is_some_and(|o| o.contains_key(key)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    StatusIn(Vec<u16>),
    Body(BodyShape),
}

/// A named assertion on a response; recorded into the `checks` rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub kind: CheckKind,
}

impl Check {
    pub fn status(name: impl Into<String>, accepted: &[u16]) -> Self {
        Self {
            name: name.into(),
            kind: CheckKind::StatusIn(accepted.to_vec()),
        }
    }

    pub fn body(name: impl Into<String>, shape: BodyShape) -> Self {
        Self {
            name: name.into(),
            kind: CheckKind::Body(shape),
        }
    }

    /// Evaluates the check against a response; `None` stands for a network failure.
    pub fn evaluate(&self, response: Option<(u16, &[u8])>) -> bool {
        let Some((status, body)) = response else {
            return false;
        };
        match &self.kind {
            CheckKind::StatusIn(accepted) => accepted.contains(&status),
            CheckKind::Body(shape) => shape.matches(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Tag value for the `endpoint` tag.
    pub endpoint: String,
    pub method: Method,
    /// Path plus query, relative to the base URL.
    pub path: String,
    pub body: Option<Value>,
    /// Statuses that do not count as a failed request.
    pub expected_status: Vec<u16>,
    pub checks: Vec<Check>,
}

impl Step {
    pub fn get(endpoint: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::GET,
            path: path.into(),
            body: None,
            expected_status: vec![200],
            checks: Vec::new(),
        }
    }

    #[must_use]
    pub fn expect(mut self, statuses: &[u16]) -> Self {
        self.expected_status = statuses.to_vec();
        self
    }

    #[must_use]
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    /// Skipped entirely when setup produced no token.
    pub requires_auth: bool,
    pub steps: Vec<Step>,
}

impl Group {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            requires_auth: false,
            steps,
        }
    }

    #[must_use]
    pub fn authenticated(mut self) -> Self {
        self.requires_auth = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Flow {
    pub groups: Vec<Group>,
}

fn ok_array(endpoint: &str, path: &str) -> Step {
    Step::get(endpoint, path)
        .check(Check::status(format!("{endpoint} status is 200"), &[200]))
        .check(Check::body(
            format!("{endpoint} returns a list"),
            BodyShape::JsonArray,
        ))
}

fn found_or_missing(endpoint: &str, path: &str) -> Step {
    Step::get(endpoint, path)
        .expect(&[200, 404])
        .check(Check::status(
            format!("{endpoint} status is 200 or 404"),
            &[200, 404],
        ))
}

/// The OLSHEETS browsing flow: public catalog groups, then the signed-in account group.
pub fn default_flow() -> Flow {
    Flow {
        groups: vec![
            Group::new(
                "health",
                vec![
                    Step::get("health", "/actuator/health")
                        .check(Check::status("health status is 200", &[200])),
                ],
            ),
            Group::new(
                "sheets",
                vec![
                    ok_array("sheets list", "/api/sheets"),
                    ok_array("sheets search", "/api/sheets/search?name=sonata"),
                    ok_array(
                        "sheets by category",
                        "/api/sheets/filter/category?category=CLASSICAL",
                    ),
                    found_or_missing("sheet detail", "/api/sheets/1"),
                ],
            ),
            Group::new(
                "instruments",
                vec![
                    ok_array("instruments search", "/api/instruments/search?name=piano"),
                    ok_array(
                        "instruments by type",
                        "/api/instruments/filter/type?type=ACOUSTIC",
                    ),
                    ok_array(
                        "instruments by family",
                        "/api/instruments/filter/family?family=KEYBOARD",
                    ),
                    found_or_missing("instrument detail", "/api/instruments/1"),
                    ok_array("instrument availability", "/api/availability/instrument/1"),
                ],
            ),
            Group::new(
                "pricing",
                vec![found_or_missing("item price", "/api/items/price/1")],
            ),
            Group::new(
                "account",
                vec![
                    Step::get("validate token", "/api/auth/validate")
                        .check(Check::status("validate status is 200", &[200]))
                        .check(Check::body(
                            "validate returns username",
                            BodyShape::JsonObjectWithKey("username".to_string()),
                        )),
                    Step::get("current user", "/api/auth/me")
                        .check(Check::status("me status is 200", &[200]))
                        .check(Check::body(
                            "me returns username",
                            BodyShape::JsonObjectWithKey("username".to_string()),
                        )),
                    ok_array("my instruments", "/api/instruments/my-instruments"),
                    ok_array("my bookings", "/api/bookings/my-bookings"),
                ],
            )
            .authenticated(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_shapes() {
        assert!(BodyShape::JsonArray.matches(b"[1,2]"));
        assert!(!BodyShape::JsonArray.matches(b"{}"));
        assert!(BodyShape::JsonObject.matches(br#"{"a":1}"#));
        assert!(!BodyShape::JsonObject.matches(b"not json"));
        let key = BodyShape::JsonObjectWithKey("token".to_string());
        assert!(key.matches(br#"{"token":"t"}"#));
        assert!(!key.matches(br#"{"error":"x"}"#));
        assert!(!key.matches(br#"[{"token":"t"}]"#));
    }

    #[test]
    fn network_failure_fails_every_check() {
        let status = Check::status("ok", &[200]);
        let body = Check::body("list", BodyShape::JsonArray);
        assert!(!status.evaluate(None));
        assert!(!body.evaluate(None));
        assert!(status.evaluate(Some((200, b""))));
        assert!(!status.evaluate(Some((500, b""))));
    }

    #[test]
    fn default_flow_covers_catalog_and_account_endpoints() {
        let flow = default_flow();
        let names: Vec<_> = flow.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["health", "sheets", "instruments", "pricing", "account"]);
        let steps: usize = flow.groups.iter().map(|g| g.steps.len()).sum();
        assert_eq!(steps, 15);

        let account = flow
            .groups
            .iter()
            .find(|g| g.name == "account")
            .unwrap_or_else(|| panic!("account group"));
        assert!(account.requires_auth);
        assert!(flow.groups.iter().filter(|g| g.requires_auth).count() == 1);

        let price = &flow.groups[3].steps[0];
        assert_eq!(price.expected_status, vec![200, 404]);
    }
}
