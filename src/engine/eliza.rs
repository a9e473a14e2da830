//! ELIZA: keyword, decomposition and reassembly rules read from a doctor script.
//!
//! Script lines are `tag: content`. Supported tags are `initial`, `final`,
//! `quit`, `pre`, `post`, `synon`, `key` (word and optional weight),
//! `decomp` (a leading `$` stores the reply for later) and `reasmb`
//! (`goto key` jumps to another key, `(n)` inserts the n-th matched fragment).
//! Reassemblies rotate in order, so the engine is deterministic.

use super::{EngineKind, ResponseEngine};
use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;
use std::sync::OnceLock;

/// The classic DOCTOR script.
pub const DOCTOR_SCRIPT: &str = include_str!("../../data/eliza/doctor.txt");

const MAX_GOTO_DEPTH: usize = 8;
const STOP_TOKENS: &[&str] = &[",", ".", ";", "!", "?"];

#[derive(Debug)]
struct Decomp {
    parts: Vec<String>,
    save: bool,
    reassemblies: Vec<Vec<String>>,
    next: usize,
}

#[derive(Debug)]
struct Key {
    weight: i32,
    decomps: Vec<Decomp>,
}

#[derive(Debug)]
pub struct ElizaEngine {
    greeting: String,
    farewell: String,
    quits: HashSet<String>,
    pre: HashMap<String, Vec<String>>,
    post: HashMap<String, Vec<String>>,
    synonyms: HashMap<String, Vec<String>>,
    keys: HashMap<String, Key>,
    memory: VecDeque<Vec<String>>,
}

impl ElizaEngine {
    pub fn new() -> Result<Self> {
        Self::from_script(DOCTOR_SCRIPT).context("built-in DOCTOR script is malformed")
    }

    pub fn from_script(script: &str) -> Result<Self> {
        let mut engine = ElizaEngine {
            greeting: String::new(),
            farewell: String::new(),
            quits: HashSet::new(),
            pre: HashMap::new(),
            post: HashMap::new(),
            synonyms: HashMap::new(),
            keys: HashMap::new(),
            memory: VecDeque::new(),
        };
        let mut current_key: Option<String> = None;

        for (number, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let number = number + 1;
            let (tag, content) = line
                .split_once(':')
                .ok_or_else(|| anyhow!("line {}: expected `tag: content`", number))?;
            let content = content.trim();

            match tag.trim() {
                "initial" => engine.greeting = content.to_string(),
                "final" => engine.farewell = content.to_string(),
                "quit" => {
                    engine.quits.insert(content.to_lowercase());
                }
                tag @ ("pre" | "post") => {
                    let mut words = content.split_whitespace();
                    let from = words
                        .next()
                        .ok_or_else(|| anyhow!("line {}: empty substitution", number))?
                        .to_lowercase();
                    let to = words.map(str::to_string).collect();
                    let table = if tag == "pre" { &mut engine.pre } else { &mut engine.post };
                    table.insert(from, to);
                }
                "synon" => {
                    let words: Vec<String> = content.split_whitespace().map(str::to_lowercase).collect();
                    let root = words
                        .first()
                        .cloned()
                        .ok_or_else(|| anyhow!("line {}: empty synonym group", number))?;
                    engine.synonyms.insert(root, words);
                }
                "key" => {
                    let mut words = content.split_whitespace();
                    let word = words
                        .next()
                        .ok_or_else(|| anyhow!("line {}: key without a word", number))?
                        .to_lowercase();
                    let weight = match words.next() {
                        Some(weight) => weight
                            .parse()
                            .with_context(|| format!("line {}: bad key weight {:?}", number, weight))?,
                        None => 1,
                    };
                    engine.keys.insert(
                        word.clone(),
                        Key {
                            weight,
                            decomps: Vec::new(),
                        },
                    );
                    current_key = Some(word);
                }
                "decomp" => {
                    let key = current_key
                        .as_ref()
                        .and_then(|k| engine.keys.get_mut(k))
                        .ok_or_else(|| anyhow!("line {}: decomp outside of a key", number))?;
                    let mut parts: Vec<String> = content.split_whitespace().map(str::to_string).collect();
                    let save = parts.first().map(|p| p == "$").unwrap_or(false);
                    if save {
                        parts.remove(0);
                    }
                    key.decomps.push(Decomp {
                        parts,
                        save,
                        reassemblies: Vec::new(),
                        next: 0,
                    });
                }
                "reasmb" => {
                    let decomp = current_key
                        .as_ref()
                        .and_then(|k| engine.keys.get_mut(k))
                        .and_then(|k| k.decomps.last_mut())
                        .ok_or_else(|| anyhow!("line {}: reasmb outside of a decomp", number))?;
                    decomp
                        .reassemblies
                        .push(content.split_whitespace().map(str::to_string).collect());
                }
                other => bail!("line {}: unknown tag {:?}", number, other),
            }
        }

        engine.validate()?;
        Ok(engine)
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn farewell(&self) -> &str {
        &self.farewell
    }

    fn validate(&self) -> Result<()> {
        let has_fallback = self
            .keys
            .get("xnone")
            .and_then(|k| k.decomps.first())
            .map(|d| !d.reassemblies.is_empty())
            .unwrap_or(false);
        if !has_fallback {
            bail!("script needs an xnone key with at least one reassembly");
        }

        for (word, key) in &self.keys {
            for decomp in &key.decomps {
                if decomp.reassemblies.is_empty() {
                    bail!("key {:?} has a decomposition without reassemblies", word);
                }
                for part in &decomp.parts {
                    if let Some(root) = part.strip_prefix('@') {
                        if !self.synonyms.contains_key(&root.to_lowercase()) {
                            bail!("key {:?} uses unknown synonym group @{}", word, root);
                        }
                    }
                }
                for reassembly in &decomp.reassemblies {
                    if reassembly.first().map(String::as_str) == Some("goto") {
                        let target = reassembly
                            .get(1)
                            .ok_or_else(|| anyhow!("key {:?} has a goto without a target", word))?;
                        if !self.keys.contains_key(&target.to_lowercase()) {
                            bail!("key {:?} jumps to unknown key {:?}", word, target);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn reply(&mut self, input: &str) -> Result<String> {
        if self.quits.contains(&input.trim().to_lowercase()) {
            return Ok(self.farewell.clone());
        }

        let words = substitute(&tokenize(input), &self.pre);
        let mut seen = HashSet::new();
        let mut keys: Vec<(i32, String)> = words
            .iter()
            .map(|w| w.to_lowercase())
            .filter(|w| seen.insert(w.clone()))
            .filter_map(|w| self.keys.get(&w).map(|k| (k.weight, w)))
            .collect();
        keys.sort_by(|a, b| b.0.cmp(&a.0));

        let mut output = None;
        for (_, key) in keys {
            if let Some(reply) = self.match_key(&words, &key, 0)? {
                output = Some(reply);
                break;
            }
        }

        let output = match output {
            Some(reply) => reply,
            None => match self.memory.pop_front() {
                Some(remembered) => remembered,
                None => self
                    .next_reassembly("xnone", 0)
                    .ok_or_else(|| anyhow!("script has no xnone reassembly"))?,
            },
        };

        Ok(tidy(&output.join(" ")))
    }

    fn match_key(&mut self, words: &[String], key: &str, depth: usize) -> Result<Option<Vec<String>>> {
        if depth > MAX_GOTO_DEPTH {
            bail!("goto chain through {:?} is too long", key);
        }
        let decomp_count = self
            .keys
            .get(key)
            .map(|k| k.decomps.len())
            .ok_or_else(|| anyhow!("unknown key {:?}", key))?;

        for index in 0..decomp_count {
            let Some((parts, save)) = self
                .keys
                .get(key)
                .and_then(|k| k.decomps.get(index))
                .map(|d| (d.parts.clone(), d.save))
            else {
                continue;
            };

            let mut ranges = Vec::new();
            if !self.match_decomp(&parts, words, 0, &mut ranges) {
                continue;
            }
            let fragments: Vec<Vec<String>> = ranges
                .into_iter()
                .map(|range| substitute(&words[range], &self.post))
                .collect();

            let Some(reassembly) = self.next_reassembly(key, index) else {
                continue;
            };
            if reassembly.first().map(String::as_str) == Some("goto") {
                let target = reassembly
                    .get(1)
                    .map(|t| t.to_lowercase())
                    .ok_or_else(|| anyhow!("goto without a target in key {:?}", key))?;
                return self.match_key(words, &target, depth + 1);
            }

            let output = reassemble(&reassembly, &fragments)?;
            if save {
                self.memory.push_back(output);
                continue;
            }
            return Ok(Some(output));
        }

        Ok(None)
    }

    /// `*` matches any run of words, longest first; `@root` matches one word
    /// from that synonym group. Fragments are recorded as ranges into `words`.
    fn match_decomp(
        &self,
        parts: &[String],
        words: &[String],
        pos: usize,
        fragments: &mut Vec<Range<usize>>,
    ) -> bool {
        let Some((part, rest)) = parts.split_first() else {
            return pos == words.len();
        };

        if part == "*" {
            for end in (pos..=words.len()).rev() {
                fragments.push(pos..end);
                if self.match_decomp(rest, words, end, fragments) {
                    return true;
                }
                fragments.pop();
            }
            return false;
        }

        let Some(word) = words.get(pos) else {
            return false;
        };

        if let Some(root) = part.strip_prefix('@') {
            let in_group = self
                .synonyms
                .get(&root.to_lowercase())
                .map(|group| group.contains(&word.to_lowercase()))
                .unwrap_or(false);
            if !in_group {
                return false;
            }
            fragments.push(pos..pos + 1);
            if self.match_decomp(rest, words, pos + 1, fragments) {
                return true;
            }
            fragments.pop();
            return false;
        }

        part.eq_ignore_ascii_case(word) && self.match_decomp(rest, words, pos + 1, fragments)
    }

    fn next_reassembly(&mut self, key: &str, index: usize) -> Option<Vec<String>> {
        let decomp = self.keys.get_mut(key)?.decomps.get_mut(index)?;
        if decomp.reassemblies.is_empty() {
            return None;
        }
        let chosen = decomp.reassemblies[decomp.next % decomp.reassemblies.len()].clone();
        decomp.next += 1;
        Some(chosen)
    }
}

impl ResponseEngine for ElizaEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Eliza
    }

    fn respond(&mut self, input: &str) -> Result<String> {
        self.reply(input)
    }
}

/// Splits on whitespace, keeping sentence punctuation as separate tokens.
fn tokenize(input: &str) -> Vec<String> {
    let mut spaced = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '.' | ',' | ';' | '!' | '?') {
            spaced.push(' ');
            spaced.push(c);
            spaced.push(' ');
        } else {
            spaced.push(c);
        }
    }
    spaced.split_whitespace().map(str::to_string).collect()
}

fn substitute(words: &[String], table: &HashMap<String, Vec<String>>) -> Vec<String> {
    let mut output = Vec::with_capacity(words.len());
    for word in words {
        match table.get(&word.to_lowercase()) {
            Some(replacement) => output.extend(replacement.iter().cloned()),
            None => output.push(word.clone()),
        }
    }
    output
}

/// Expands `(n)` markers. A fragment stops at its first punctuation token.
fn reassemble(reassembly: &[String], fragments: &[Vec<String>]) -> Result<Vec<String>> {
    let mut output = Vec::new();

    for word in reassembly {
        let marker = word
            .strip_prefix('(')
            .and_then(|w| w.split_once(')'))
            .and_then(|(n, suffix)| n.parse::<usize>().ok().map(|n| (n, suffix)));

        match marker {
            Some((index, suffix)) => {
                let fragment = index
                    .checked_sub(1)
                    .and_then(|i| fragments.get(i))
                    .ok_or_else(|| anyhow!("reassembly refers to missing fragment ({})", index))?;
                let end = fragment
                    .iter()
                    .position(|w| STOP_TOKENS.contains(&w.as_str()))
                    .unwrap_or(fragment.len());
                output.extend(fragment[..end].iter().cloned());
                if !suffix.is_empty() {
                    output.push(suffix.to_string());
                }
            }
            None => output.push(word.clone()),
        }
    }

    Ok(output)
}

fn tidy(text: &str) -> String {
    static SPACE_BEFORE_PUNCT: OnceLock<Regex> = OnceLock::new();
    let pattern = SPACE_BEFORE_PUNCT.get_or_init(|| Regex::new(r"\s+([.,;!?])").expect("valid punctuation regex"));
    pattern.replace_all(text.trim(), "$1").into_owned()
}
