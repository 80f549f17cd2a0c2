use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::errors::SendError;
use crate::session::Locator;

pub const APP_READY: &str = "app_ready";
pub const SEARCH_BOX: &str = "search_box";
pub const MESSAGE_BOX: &str = "message_box";
pub const ATTACH_BUTTON: &str = "attach_button";
pub const MEDIA_ENTRY: &str = "media_entry";
pub const DOCUMENT_ENTRY: &str = "document_entry";
pub const CAPTION_BOX: &str = "caption_box";
pub const SEND_BUTTON: &str = "send_button";

pub const ELEMENT_NAMES: [&str; 8] = [
    APP_READY,
    SEARCH_BOX,
    MESSAGE_BOX,
    ATTACH_BUTTON,
    MEDIA_ENTRY,
    DOCUMENT_ENTRY,
    CAPTION_BOX,
    SEND_BUTTON,
];

/// Candidate locators per logical element, most recently validated first.
/// Stable attribute selectors (aria labels, data-icon) lead; positional
/// paths trail as a last resort.
const BUILTIN: &[(&str, &[&str])] = &[
    (
        APP_READY,
        &[
            "css=div[contenteditable='true'][data-tab='3']",
            "css=div[data-tab='3']",
            "css=#side",
        ],
    ),
    (
        SEARCH_BOX,
        &[
            "css=div[contenteditable='true'][data-tab='3']",
            "xpath=//div[@role='textbox' and @contenteditable='true' and @data-tab='3']",
            "css=#side div[contenteditable='true']",
        ],
    ),
    (
        MESSAGE_BOX,
        &[
            "css=footer div[contenteditable='true'][data-tab='10']",
            "css=div[contenteditable='true'][data-tab='10']",
            "xpath=//footer//div[@role='textbox']",
            "css=footer div[contenteditable='true']",
        ],
    ),
    (
        ATTACH_BUTTON,
        &[
            "xpath=//div[@aria-label='Anexar']",
            "xpath=//div[@aria-label='Attach']",
            "css=span[data-icon='plus-rounded']",
            "css=span[data-icon='plus']",
            "css=span[data-icon='clip']",
        ],
    ),
    (
        MEDIA_ENTRY,
        &[
            "xpath=//div[@aria-label='Fotos e vídeos']",
            "xpath=//div[@aria-label='Photos & videos']",
            "css=#app > div > div > span:nth-child(8) > div > ul > div > div > div:nth-child(2) > li > div > span",
            "xpath=//*[@id='app']/div/div/span[6]/div/ul/div/div/div[2]/li/div/span",
        ],
    ),
    (
        DOCUMENT_ENTRY,
        &[
            "xpath=//div[@aria-label='Documento']",
            "xpath=//div[@aria-label='Document']",
            "css=#app > div > div > span:nth-child(8) > div > ul > div > div > div:nth-child(1) > li > div > span",
            "xpath=//*[@id='app']/div/div/span[6]/div/ul/div/div/div[1]/li/div/span",
        ],
    ),
    (
        CAPTION_BOX,
        &[
            "xpath=//div[contains(@aria-label, 'legenda')]",
            "xpath=//div[contains(@aria-label, 'caption')]",
            "css=div.lexical-rich-text-input div[contenteditable='true']",
        ],
    ),
    (
        SEND_BUTTON,
        &[
            "xpath=//span[@data-icon='send']",
            "xpath=//div[@role='button' and @aria-label='Enviar']",
            "xpath=//div[@role='button' and @aria-label='Send']",
            "css=div[aria-label='Enviar'] span[data-icon='send']",
            "css=span[data-icon='wds-ic-send-filled']",
        ],
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorCatalog {
    entries: HashMap<String, Vec<Locator>>,
}

impl Default for SelectorCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SelectorCatalog {
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(name, raw)| {
                let locators = raw
                    .iter()
                    .filter_map(|value| value.parse::<Locator>().ok())
                    .collect();
                (name.to_string(), locators)
            })
            .collect();
        Self { entries }
    }

    /// Built-in catalog with per-element overrides from a JSON file shaped
    /// like `{"send_button": ["xpath=...", "css=..."]}`. Unknown names are
    /// rejected so a typo does not silently keep stale locators.
    pub fn load(path: &Path) -> Result<Self, SendError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SendError> {
        let overrides: HashMap<String, Vec<String>> = serde_json::from_str(raw)?;
        let mut catalog = Self::builtin();
        for (name, values) in overrides {
            if !ELEMENT_NAMES.contains(&name.as_str()) {
                return Err(SendError::Catalog(format!("unknown element '{}'", name)));
            }
            let locators = values
                .iter()
                .map(|value| value.parse::<Locator>())
                .collect::<Result<Vec<_>, _>>()?;
            if locators.is_empty() {
                return Err(SendError::Catalog(format!(
                    "element '{}' has no candidates",
                    name
                )));
            }
            catalog.entries.insert(name, locators);
        }
        Ok(catalog)
    }

    pub fn candidates(&self, name: &str) -> Result<&[Locator], SendError> {
        self.entries
            .get(name)
            .map(Vec::as_slice)
            .filter(|locators| !locators.is_empty())
            .ok_or_else(|| SendError::Catalog(format!("no candidates for '{}'", name)))
    }

    pub fn set(&mut self, name: impl Into<String>, locators: Vec<Locator>) {
        self.entries.insert(name.into(), locators);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_every_element() {
        let catalog = SelectorCatalog::builtin();
        for name in ELEMENT_NAMES {
            let candidates = catalog.candidates(name).expect("candidates");
            assert!(!candidates.is_empty(), "{} has no candidates", name);
        }
        assert_eq!(
            catalog.candidates(SEND_BUTTON).expect("send")[0],
            Locator::xpath("//span[@data-icon='send']")
        );
    }

    #[test]
    fn json_override_replaces_only_named_elements() {
        let catalog = SelectorCatalog::from_json(
            r#"{"send_button": ["css=button.send-new", "xpath=//button[@title='Send']"]}"#,
        )
        .expect("catalog");
        let send = catalog.candidates(SEND_BUTTON).expect("send");
        assert_eq!(send.len(), 2);
        assert_eq!(send[0], Locator::css("button.send-new"));
        assert_eq!(
            catalog.candidates(SEARCH_BOX).expect("search"),
            SelectorCatalog::builtin().candidates(SEARCH_BOX).expect("builtin")
        );
    }

    #[test]
    fn json_override_rejects_unknown_or_empty_entries() {
        assert!(matches!(
            SelectorCatalog::from_json(r#"{"sned_button": ["css=x"]}"#),
            Err(SendError::Catalog(_))
        ));
        assert!(matches!(
            SelectorCatalog::from_json(r#"{"send_button": []}"#),
            Err(SendError::Catalog(_))
        ));
    }
}
