//! The permissions range of the mashup envelope.
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <PermissionList xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">
//!   <CanEvaluateFuturePackages>false</CanEvaluateFuturePackages>
//!   <FirewallEnabled>true</FirewallEnabled>
//!   <WorkbookGroupType xsi:nil="true" />
//! </PermissionList>
//! ```

use crate::common::encoding::TextEncoding;
use crate::common::xml::{entity_text, escape_xml};
use crate::common::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};

const ROOT: &[u8] = b"PermissionList";

/// Query evaluation permissions of a mashup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Permissions {
    pub can_evaluate_future_packages: bool,
    pub firewall_enabled: bool,
    /// `None` when the element is `xsi:nil`
    pub workbook_group_type: Option<String>,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            can_evaluate_future_packages: false,
            firewall_enabled: true,
            workbook_group_type: None,
        }
    }
}

impl Permissions {
    /// Parse the UTF-8 permissions XML. A leading BOM is ignored.
    pub fn from_xml(bytes: &[u8]) -> Result<Self> {
        let text = TextEncoding::Utf8
            .decode(bytes)
            .map_err(Error::CorruptContainer)?;
        // Whitespace is kept: trimming would eat the spaces around entity
        // references inside values.
        let mut reader = Reader::from_str(&text);

        let mut permissions = Permissions::default();
        let mut saw_root = false;
        let mut current: Option<Vec<u8>> = None;
        let mut value = String::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.local_name().as_ref().to_vec();
                    if !saw_root {
                        if name != ROOT {
                            return Err(not_a_permission_list(&name));
                        }
                        saw_root = true;
                    } else {
                        value.clear();
                        current = Some(name);
                    }
                },
                Event::Empty(e) => {
                    let name = e.local_name();
                    if !saw_root {
                        if name.as_ref() != ROOT {
                            return Err(not_a_permission_list(name.as_ref()));
                        }
                        saw_root = true;
                    } else if name.as_ref() == b"WorkbookGroupType" {
                        // Empty or xsi:nil both mean "no group type"
                        permissions.workbook_group_type = None;
                    }
                },
                Event::Text(e) if current.is_some() => {
                    value.push_str(std::str::from_utf8(e.as_ref())?);
                },
                Event::GeneralRef(e) if current.is_some() => {
                    value.push_str(&entity_text(&e)?);
                },
                Event::End(_) => {
                    if let Some(name) = current.take() {
                        permissions.apply(&name, value.trim())?;
                    }
                },
                Event::Eof => break,
                _ => {},
            }
        }

        if !saw_root {
            return Err(not_a_permission_list(b""));
        }
        Ok(permissions)
    }

    fn apply(&mut self, element: &[u8], value: &str) -> Result<()> {
        match element {
            b"CanEvaluateFuturePackages" => self.can_evaluate_future_packages = parse_bool(value)?,
            b"FirewallEnabled" => self.firewall_enabled = parse_bool(value)?,
            b"WorkbookGroupType" => {
                self.workbook_group_type = (!value.is_empty()).then(|| value.to_string());
            },
            other => tracing::debug!(
                element = %String::from_utf8_lossy(other),
                "ignoring unknown permission"
            ),
        }
        Ok(())
    }

    /// Serialize to UTF-8 XML without a BOM.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(320);
        xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
        xml.push_str(
            r#"<PermissionList xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">"#,
        );
        xml.push_str(&format!(
            "<CanEvaluateFuturePackages>{}</CanEvaluateFuturePackages>",
            self.can_evaluate_future_packages
        ));
        xml.push_str(&format!(
            "<FirewallEnabled>{}</FirewallEnabled>",
            self.firewall_enabled
        ));
        match &self.workbook_group_type {
            Some(group) => xml.push_str(&format!(
                "<WorkbookGroupType>{}</WorkbookGroupType>",
                escape_xml(group)
            )),
            None => xml.push_str(r#"<WorkbookGroupType xsi:nil="true" />"#),
        }
        xml.push_str("</PermissionList>");
        xml
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::CorruptContainer(format!(
            "expected a boolean permission, got '{}'",
            value
        )))
    }
}

fn not_a_permission_list(root: &[u8]) -> Error {
    Error::CorruptContainer(format!(
        "expected a PermissionList document, found '{}'",
        String::from_utf8_lossy(root)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_bom_and_nil() {
        let xml = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\
            <PermissionList xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
            <CanEvaluateFuturePackages>true</CanEvaluateFuturePackages>\
            <FirewallEnabled>false</FirewallEnabled>\
            <WorkbookGroupType xsi:nil=\"true\" />\
            </PermissionList>";
        let permissions = Permissions::from_xml(xml.as_bytes()).unwrap();
        assert!(permissions.can_evaluate_future_packages);
        assert!(!permissions.firewall_enabled);
        assert_eq!(permissions.workbook_group_type, None);
    }

    #[test]
    fn test_round_trip_with_group() {
        let permissions = Permissions {
            can_evaluate_future_packages: false,
            firewall_enabled: true,
            workbook_group_type: Some("Organizational & Public".into()),
        };
        let xml = permissions.to_xml();
        assert!(xml.contains("Organizational &amp; Public"));
        assert_eq!(Permissions::from_xml(xml.as_bytes()).unwrap(), permissions);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(Permissions::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "CanEvaluateFuturePackages": false,
                "FirewallEnabled": true,
                "WorkbookGroupType": null
            })
        );
    }

    #[test]
    fn test_rejects_other_documents() {
        assert!(Permissions::from_xml(b"<Other/>").is_err());
        assert!(
            Permissions::from_xml(b"<PermissionList><FirewallEnabled>maybe</FirewallEnabled></PermissionList>")
                .is_err()
        );
    }
}
