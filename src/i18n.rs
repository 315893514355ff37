// src/i18n.rs
//
// Lightweight runtime i18n for console messages:
// - Strings live in assets/i18n.json, format: { "<lang>": { "key": "value" } }
// - Load order: selected lang -> fallback zh-Hans
// - Lookup: tr("key") / tr_with("key", &[("name", "...")]) with {name} placeholders
//
// Language selection:
// - CLI: --lang <code> (e.g. en, zh-Hans)
// - Env: SKYBOX_LANG
// - Default: zh-Hans

use once_cell::sync::OnceCell;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

const FALLBACK_LANG: &str = "zh-Hans";

#[derive(Debug, Clone)]
struct I18n {
    map: HashMap<String, String>,
    fallback_map: HashMap<String, String>,
}

static I18N: OnceCell<RwLock<I18n>> = OnceCell::new();

fn load_lang_from(path: &Path, lang: &str) -> Option<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).ok()?;
    let all: HashMap<String, HashMap<String, String>> = serde_json::from_str(&text).ok()?;
    all.get(lang).cloned()
}

/// Find assets/i18n.json by searching:
/// 1) <exe_dir>/assets/i18n.json
/// 2) ./assets/i18n.json  (dev working dir)
fn find_table_file() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join("assets").join("i18n.json");
            if p.exists() {
                return Some(p);
            }
        }
    }

    let p = PathBuf::from("assets").join("i18n.json");
    if p.exists() {
        return Some(p);
    }

    None
}

fn load_lang(lang: &str) -> HashMap<String, String> {
    if let Some(p) = find_table_file() {
        if let Some(m) = load_lang_from(&p, lang) {
            return m;
        }
    }
    HashMap::new()
}

/// Initialize global i18n. Safe to call multiple times; later calls overwrite
/// the current maps.
pub fn init(lang: impl Into<String>) {
    let lang = lang.into();

    let map = load_lang(&lang);
    let fallback_map = if lang == FALLBACK_LANG {
        map.clone()
    } else {
        load_lang(FALLBACK_LANG)
    };

    let i = I18n { map, fallback_map };

    if let Some(lock) = I18N.get() {
        if let Ok(mut w) = lock.write() {
            *w = i;
        }
    } else {
        let _ = I18N.set(RwLock::new(i));
    }
}

/// Get localized text by key. If key missing, returns key itself.
pub fn tr(key: &str) -> String {
    let Some(lock) = I18N.get() else {
        return key.to_string();
    };
    let Ok(i) = lock.read() else {
        return key.to_string();
    };

    if let Some(v) = i.map.get(key) {
        return v.clone();
    }
    if let Some(v) = i.fallback_map.get(key) {
        return v.clone();
    }
    key.to_string()
}

/// Get localized text and substitute `{name}` placeholders.
/// Any placeholder not provided is kept as-is.
pub fn tr_with(key: &str, args: &[(&str, String)]) -> String {
    let mut s = tr(key);
    for (k, v) in args {
        let placeholder = format!("{{{}}}", k);
        s = s.replace(&placeholder, v);
    }
    s
}

/// Choose language from CLI/env.
pub fn resolve_lang_from_args() -> String {
    // CLI: --lang <code>
    let mut it = std::env::args();
    while let Some(a) = it.next() {
        if a == "--lang" {
            if let Some(v) = it.next() {
                return v;
            }
        }
    }

    // Env: SKYBOX_LANG
    if let Ok(v) = std::env::var("SKYBOX_LANG") {
        if !v.trim().is_empty() {
            return v;
        }
    }

    FALLBACK_LANG.to_string()
}
