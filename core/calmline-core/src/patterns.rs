//! Compiled regex patterns for distress detection and reply filtering.
//!
//! Patterns are compiled once on first use. Every detector pattern is
//! case-insensitive and word-bounded; "can't" also accepts "cant" and "cannot".

use once_cell::sync::Lazy;
use regex::Regex;

fn compile(patterns: &[&str]) -> Regex {
    let joined = patterns.join("|");
    Regex::new(&format!("(?i){}", joined)).expect("static detector pattern must compile")
}

// ═══════════════════════════════════════════════════════════════════════════════
// Override Categories
// ═══════════════════════════════════════════════════════════════════════════════

pub static RE_CRISIS: Lazy<Regex> = Lazy::new(|| {
    compile(&[
        r"\bhurt\s+myself\b",
        r"\bkill\s+myself\b",
        r"\bsuicid(e|al)\b",
        r"\bend\s+it\s+all\b",
        r"\bdon'?t\s+want\s+to\s+live\b",
        r"\bwant\s+to\s+die\b",
        r"\bno\s+point\s+(in\s+)?living\b",
        r"\bcan(not|'?t)\s+go\s+on\b",
    ])
});

pub static RE_STOP: Lazy<Regex> = Lazy::new(|| {
    compile(&[
        r"\bstop\b",
        r"\bend\s+(this|session)\b",
        r"\bno\s+more\b",
        r"\bleave\s+me\s+alone\b",
    ])
});

// ═══════════════════════════════════════════════════════════════════════════════
// Scored Categories
// ═══════════════════════════════════════════════════════════════════════════════

pub static RE_PANIC: Lazy<Regex> = Lazy::new(|| {
    compile(&[
        r"\bpanic(king)?\s+attack\b",
        r"\bcan(not|'?t)\s+breathe?\b",
        r"\bheart\s+(is\s+)?(racing|pounding)\b",
        r"\blosing\s+control\b",
        r"\bgoing\s+to\s+die\b",
        r"\bchest\s+(is\s+)?tight\b",
        r"\bfreaking\s+out\b",
        r"\bterri(fied|ble)\b",
    ])
});

pub static RE_OVERWHELMED: Lazy<Regex> = Lazy::new(|| {
    compile(&[
        r"\btoo\s+much\b",
        r"\bover(whelm|load)(ed|ing)?\b",
        r"\bshut(ting)?\s+down\b",
        r"\bcan(not|'?t)\s+handle\b",
        r"\bcan(not|'?t)\s+think\b",
        r"\bparalyz(ed|ing)\b",
        r"\bfrozen\b",
        r"\bcollapsing\b",
    ])
});

pub static RE_RISING: Lazy<Regex> = Lazy::new(|| {
    compile(&[
        r"\banxious\b",
        r"\bworri(ed|es)\b",
        r"\bnervous\b",
        r"\bstress(ed|ful)\b",
        r"\bscared\b",
        r"\buneasy\b",
        r"\btense\b",
        r"\bon\s+edge\b",
    ])
});

pub static RE_RECOVERY: Lazy<Regex> = Lazy::new(|| {
    compile(&[
        r"\bfeeling\s+better\b",
        r"\bcalm(er|ing)\b",
        r"\bsettl(ing|ed)\b",
        r"\brelax(ed|ing)\b",
        r"\bimproved\b",
        r"\beasier\b",
    ])
});

// ═══════════════════════════════════════════════════════════════════════════════
// Reply Filtering
// ═══════════════════════════════════════════════════════════════════════════════

pub static RE_CLINICAL_TERMS: Lazy<Regex> = Lazy::new(|| {
    compile(&[
        r"\bdiagnos(is|e|ed)\b",
        r"\bmedication\b",
        r"\bprescri(be|ption)\b",
        r"\bdisorder\b",
        r"\btherapy\b",
        r"\bcounseling\b",
        r"\bpsychiatri(st|c)\b",
        r"\btreatment\b",
        r"\bdoctor\b",
    ])
});

/// Phrases rewritten in generated replies, paired with their replacement.
pub static RE_REPLY_REWRITES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (compile(&[r"\bclose\s+your\s+eyes\b"]), "soften your gaze"),
        (compile(&[r"\bshut\s+your\s+eyes\b"]), "soften your gaze"),
        (compile(&[r"\brelax\s+completely\b"]), "let your shoulders drop"),
        (compile(&[r"\bdon'?t\s+worry\b"]), "you're safe right now"),
    ]
});

pub static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
