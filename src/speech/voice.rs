//! Output voice selection over a catalog snapshot.

use crate::speech::types::VoiceDescriptor;

/// Picks the best voice for `language_prefix` (e.g. `"es"`).
///
/// First match wins: a non-local voice whose tag starts with the prefix, any
/// voice whose tag starts with the prefix, any voice whose display name names
/// the language. `None` means the platform default voice should be used.
pub fn select_voice<'a>(
    voices: &'a [VoiceDescriptor],
    language_prefix: &str,
) -> Option<&'a VoiceDescriptor> {
    let prefix = language_prefix.trim().to_ascii_lowercase();
    if prefix.is_empty() {
        return None;
    }

    let tag_matches = |voice: &&VoiceDescriptor| voice.lang.to_ascii_lowercase().starts_with(&prefix);

    voices
        .iter()
        .filter(tag_matches)
        .find(|voice| !voice.local_service)
        .or_else(|| voices.iter().find(tag_matches))
        .or_else(|| {
            let names = language_names(&prefix);
            voices.iter().find(|voice| {
                let display = voice.name.to_lowercase();
                names.iter().any(|name| display.contains(name))
            })
        })
}

fn language_names(prefix: &str) -> Vec<&str> {
    let known: &[&str] = match prefix {
        "es" => &["spanish", "español", "espanol", "castellano"],
        "en" => &["english"],
        "fr" => &["french", "français", "francais"],
        "de" => &["german", "deutsch"],
        "it" => &["italian", "italiano"],
        "pt" => &["portuguese", "português", "portugues"],
        _ => &[],
    };

    if known.is_empty() {
        vec![prefix]
    } else {
        known.to_vec()
    }
}
