//! ALICE: a small AIML interpreter.
//!
//! Categories are loaded into a word graph and matched with the usual AIML
//! priority at every position: `_`, then an exact word, then `*`. Wildcards
//! take one or more words. Templates understand `star`, `bot`, `get`, `set`,
//! `think`, `srai`, `sr` and `random`; unknown elements are evaluated for their
//! content.
//!
//! The brain file keeps the bot and user predicates as JSON. It is written next
//! to its final path and renamed into place.

use super::{EngineKind, ResponseEngine};
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use serenity::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Knowledge every fresh ALICE starts with.
pub const DEFAULT_KNOWLEDGE: &str = include_str!("../../data/alice/default.aiml");

/// Said when nothing in the graph matches.
pub const FALLBACK_REPLY: &str = "I have no answer for that.";

const BRAIN_VERSION: u32 = 1;
const MAX_SRAI_DEPTH: usize = 16;

type Template = Arc<Vec<Piece>>;

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Element {
        name: String,
        attrs: HashMap<String, String>,
        children: Vec<Piece>,
    },
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    template: Option<Template>,
}

impl Node {
    fn insert(&mut self, pattern: &[String], template: Template) {
        match pattern.split_first() {
            None => self.template = Some(template),
            Some((word, rest)) => self
                .children
                .entry(word.clone())
                .or_default()
                .insert(rest, template),
        }
    }

    fn find(&self, words: &[String], pos: usize, stars: &mut Vec<Range<usize>>) -> Option<&Template> {
        if pos == words.len() {
            return self.template.as_ref();
        }

        if let Some(found) = self.children.get("_").and_then(|node| node.find_wild(words, pos, stars)) {
            return Some(found);
        }
        if let Some(found) = self.children.get(&words[pos]).and_then(|node| node.find(words, pos + 1, stars)) {
            return Some(found);
        }
        self.children.get("*").and_then(|node| node.find_wild(words, pos, stars))
    }

    fn find_wild(&self, words: &[String], pos: usize, stars: &mut Vec<Range<usize>>) -> Option<&Template> {
        for end in pos + 1..=words.len() {
            stars.push(pos..end);
            if let Some(found) = self.find(words, end, stars) {
                return Some(found);
            }
            stars.pop();
        }
        None
    }
}

/// The persisted part of an ALICE instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Brain {
    pub version: u32,
    pub bot_predicates: BTreeMap<String, String>,
    pub predicates: BTreeMap<String, String>,
}

impl Brain {
    fn fresh(bot_name: &str) -> Self {
        let mut bot_predicates = BTreeMap::new();
        bot_predicates.insert("name".to_string(), bot_name.to_string());
        bot_predicates.insert("genus".to_string(), "chatterbot".to_string());
        bot_predicates.insert("master".to_string(), "the ChatterBox crew".to_string());
        bot_predicates.insert("location".to_string(), "Discord".to_string());
        bot_predicates.insert("favoritecolor".to_string(), "green".to_string());

        let mut predicates = BTreeMap::new();
        predicates.insert("name".to_string(), "friend".to_string());

        Brain {
            version: BRAIN_VERSION,
            bot_predicates,
            predicates,
        }
    }
}

pub struct AimlEngine {
    graph: Node,
    categories: usize,
    brain: Brain,
    brain_path: PathBuf,
    bot_name: String,
    random_draws: usize,
}

impl AimlEngine {
    /// Builds an engine from the default knowledge base alone. Nothing is
    /// read from or written to `brain_path` until [`AimlEngine::bootstrap`]
    /// or a persist.
    pub fn with_default_knowledge(bot_name: &str, brain_path: impl Into<PathBuf>) -> Result<Self> {
        let mut engine = AimlEngine {
            graph: Node::default(),
            categories: 0,
            brain: Brain::fresh(bot_name),
            brain_path: brain_path.into(),
            bot_name: bot_name.to_string(),
            random_draws: 0,
        };
        engine.learn(DEFAULT_KNOWLEDGE).context("default ALICE knowledge is malformed")?;
        Ok(engine)
    }

    /// Loads the default knowledge, then restores the brain file if there is
    /// one. On first run a fresh brain file is written instead.
    pub async fn bootstrap(bot_name: &str, brain_path: impl Into<PathBuf>) -> Result<Self> {
        let mut engine = Self::with_default_knowledge(bot_name, brain_path)?;

        if fs::metadata(&engine.brain_path).await.is_ok() {
            engine.load_brain().await?;
            info!("🧠 Loaded ALICE brain from {}", engine.brain_path.display());
        } else {
            engine.save_brain().await?;
            info!("🧠 Created new ALICE brain at {}", engine.brain_path.display());
        }

        Ok(engine)
    }

    /// Adds every category found in an AIML document. Returns how many were
    /// added. Nothing is added when the document is malformed.
    pub fn learn(&mut self, document: &str) -> Result<usize> {
        let tree = parse_document(document)?;
        let mut found = Vec::new();
        collect_categories(&tree, &mut found);

        let mut categories = Vec::with_capacity(found.len());
        for children in found {
            let pattern: Vec<String> = child_element(children, "pattern")
                .map(plain_text)
                .unwrap_or_default()
                .split_whitespace()
                .map(|w| w.to_uppercase())
                .collect();
            if pattern.is_empty() {
                bail!("category with an empty pattern");
            }
            let template = child_element(children, "template")
                .ok_or_else(|| anyhow!("category {:?} has no template", pattern.join(" ")))?;
            categories.push((pattern, Arc::new(template.to_vec())));
        }

        let added = categories.len();
        for (pattern, template) in categories {
            self.graph.insert(&pattern, template);
        }
        self.categories += added;
        debug!("Learned {} AIML categories ({} total)", added, self.categories);
        Ok(added)
    }

    pub fn category_count(&self) -> usize {
        self.categories
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    pub fn brain_path(&self) -> &Path {
        &self.brain_path
    }

    pub fn bot_predicate(&self, name: &str) -> Option<&str> {
        self.brain.bot_predicates.get(name).map(String::as_str)
    }

    pub fn predicate(&self, name: &str) -> Option<&str> {
        self.brain.predicates.get(name).map(String::as_str)
    }

    async fn load_brain(&mut self) -> Result<()> {
        let raw = fs::read(&self.brain_path)
            .await
            .with_context(|| format!("Could not read brain file {}", self.brain_path.display()))?;
        let brain: Brain = serde_json::from_slice(&raw)
            .with_context(|| format!("Brain file {} is corrupt", self.brain_path.display()))?;
        if brain.version != BRAIN_VERSION {
            bail!("Brain file {} has unsupported version {}", self.brain_path.display(), brain.version);
        }

        self.brain = brain;
        // The bot may have been renamed since the brain was written.
        self.brain
            .bot_predicates
            .insert("name".to_string(), self.bot_name.clone());
        Ok(())
    }

    async fn save_brain(&self) -> Result<()> {
        if let Some(parent) = self.brain_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Could not create brain directory {}", parent.display()))?;
        }

        let raw = serde_json::to_vec_pretty(&self.brain)?;
        let staging = staging_path(&self.brain_path);
        fs::write(&staging, raw)
            .await
            .with_context(|| format!("Could not write brain file {}", staging.display()))?;
        fs::rename(&staging, &self.brain_path)
            .await
            .with_context(|| format!("Could not replace brain file {}", self.brain_path.display()))?;
        Ok(())
    }

    fn reply_to_sentence(&mut self, sentence: &str, depth: usize) -> Result<String> {
        if depth > MAX_SRAI_DEPTH {
            bail!("srai recursion went deeper than {}", MAX_SRAI_DEPTH);
        }

        let words = normalize(sentence);
        if words.is_empty() {
            return Ok(String::new());
        }
        let keys: Vec<String> = words.iter().map(|w| w.to_uppercase()).collect();

        let mut ranges = Vec::new();
        let Some(template) = self.graph.find(&keys, 0, &mut ranges).cloned() else {
            return Ok(String::new());
        };
        let stars: Vec<String> = ranges.into_iter().map(|r| words[r].join(" ")).collect();

        let output = self.evaluate(&template, &stars, depth)?;
        Ok(collapse_whitespace(&output))
    }

    fn evaluate(&mut self, pieces: &[Piece], stars: &[String], depth: usize) -> Result<String> {
        let mut out = String::new();

        for piece in pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Element { name, attrs, children } => {
                    let text = self.evaluate_element(name, attrs, children, stars, depth)?;
                    out.push_str(&text);
                }
            }
        }

        Ok(out)
    }

    fn evaluate_element(
        &mut self,
        name: &str,
        attrs: &HashMap<String, String>,
        children: &[Piece],
        stars: &[String],
        depth: usize,
    ) -> Result<String> {
        match name {
            "star" => {
                let index: usize = attrs.get("index").and_then(|i| i.parse().ok()).unwrap_or(1);
                Ok(index
                    .checked_sub(1)
                    .and_then(|i| stars.get(i))
                    .cloned()
                    .unwrap_or_default())
            }
            "bot" => {
                let key = attrs.get("name").ok_or_else(|| anyhow!("<bot> without a name"))?;
                Ok(self.brain.bot_predicates.get(key).cloned().unwrap_or_default())
            }
            "get" => {
                let key = attrs.get("name").ok_or_else(|| anyhow!("<get> without a name"))?;
                Ok(self.brain.predicates.get(key).cloned().unwrap_or_default())
            }
            "set" => {
                let key = attrs
                    .get("name")
                    .cloned()
                    .ok_or_else(|| anyhow!("<set> without a name"))?;
                let value = collapse_whitespace(&self.evaluate(children, stars, depth)?);
                self.brain.predicates.insert(key, value.clone());
                Ok(value)
            }
            "think" => {
                self.evaluate(children, stars, depth)?;
                Ok(String::new())
            }
            "srai" => {
                let redirected = self.evaluate(children, stars, depth)?;
                self.reply_to_sentence(&redirected, depth + 1)
            }
            "sr" => {
                let first = stars.first().cloned().unwrap_or_default();
                self.reply_to_sentence(&first, depth + 1)
            }
            "random" => {
                let items: Vec<&Vec<Piece>> = children
                    .iter()
                    .filter_map(|child| match child {
                        Piece::Element { name, children, .. } if name == "li" => Some(children),
                        _ => None,
                    })
                    .collect();
                if items.is_empty() {
                    return Ok(String::new());
                }
                let choice = items[self.random_draws % items.len()];
                self.random_draws += 1;
                self.evaluate(choice, stars, depth)
            }
            _ => self.evaluate(children, stars, depth),
        }
    }
}

#[async_trait]
impl ResponseEngine for AimlEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Alice
    }

    fn respond(&mut self, input: &str) -> Result<String> {
        let mut replies = Vec::new();

        for sentence in input.split(['.', '!', '?']) {
            let reply = self.reply_to_sentence(sentence, 0)?;
            if !reply.is_empty() {
                replies.push(reply);
            }
        }

        if replies.is_empty() {
            return Ok(FALLBACK_REPLY.to_string());
        }
        Ok(replies.join(" "))
    }

    async fn persist(&self) -> Result<()> {
        self.save_brain().await
    }

    async fn reset(&mut self) -> Result<()> {
        fs::remove_file(&self.brain_path)
            .await
            .with_context(|| format!("Could not delete brain file {}", self.brain_path.display()))?;

        *self = Self::with_default_knowledge(&self.bot_name, self.brain_path.clone())?;
        self.save_brain().await?;
        info!("🧠 ALICE brain reset at {}", self.brain_path.display());
        Ok(())
    }
}

/// Splits into words, dropping everything that is not alphanumeric.
fn normalize(sentence: &str) -> Vec<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staging = OsString::from(path.as_os_str());
    staging.push(".tmp");
    PathBuf::from(staging)
}

/// Reads an XML document into a tree of elements and text.
fn parse_document(document: &str) -> Result<Vec<Piece>> {
    let mut reader = Reader::from_str(document);
    let mut open: Vec<(String, HashMap<String, String>, Vec<Piece>)> = Vec::new();
    let mut top = Vec::new();

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed AIML at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                let (name, attrs) = element_header(&e)?;
                open.push((name, attrs, Vec::new()));
            }
            Event::Empty(e) => {
                let (name, attrs) = element_header(&e)?;
                innermost(&mut open, &mut top).push(Piece::Element {
                    name,
                    attrs,
                    children: Vec::new(),
                });
            }
            Event::End(_) => {
                let (name, attrs, children) = open.pop().ok_or_else(|| anyhow!("unexpected closing tag"))?;
                innermost(&mut open, &mut top).push(Piece::Element { name, attrs, children });
            }
            Event::Text(e) => {
                let text = e.unescape().context("bad entity in AIML text")?;
                push_text(innermost(&mut open, &mut top), &text);
            }
            Event::CData(e) => {
                push_text(innermost(&mut open, &mut top), &String::from_utf8_lossy(&e));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some((name, _, _)) = open.last() {
        bail!("<{}> is never closed", name);
    }
    Ok(top)
}

fn element_header(e: &BytesStart) -> Result<(String, HashMap<String, String>)> {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
    let mut attrs = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.with_context(|| format!("bad attribute on <{}>", name))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
        let value = attr
            .unescape_value()
            .with_context(|| format!("bad attribute value on <{}>", name))?;
        attrs.insert(key, value.into_owned());
    }
    Ok((name, attrs))
}

fn innermost<'a>(
    open: &'a mut [(String, HashMap<String, String>, Vec<Piece>)],
    top: &'a mut Vec<Piece>,
) -> &'a mut Vec<Piece> {
    match open.last_mut() {
        Some((_, _, children)) => children,
        None => top,
    }
}

fn push_text(pieces: &mut Vec<Piece>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Piece::Text(previous)) = pieces.last_mut() {
        previous.push_str(text);
    } else {
        pieces.push(Piece::Text(text.to_string()));
    }
}

/// Finds `<category>` elements at any depth (inside `<aiml>`, `<topic>`, ...).
fn collect_categories<'a>(pieces: &'a [Piece], found: &mut Vec<&'a [Piece]>) {
    for piece in pieces {
        if let Piece::Element { name, children, .. } = piece {
            if name == "category" {
                found.push(children);
            } else {
                collect_categories(children, found);
            }
        }
    }
}

fn child_element<'a>(pieces: &'a [Piece], wanted: &str) -> Option<&'a [Piece]> {
    pieces.iter().find_map(|piece| match piece {
        Piece::Element { name, children, .. } if name == wanted => Some(children.as_slice()),
        _ => None,
    })
}

fn plain_text(pieces: &[Piece]) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Element { children, .. } => {
                out.push(' ');
                out.push_str(&plain_text(children));
                out.push(' ');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BOT: &str = "<@999999999999999999>";

    fn engine_in(dir: &TempDir) -> AimlEngine {
        AimlEngine::with_default_knowledge(BOT, dir.path().join("alice.brain")).unwrap()
    }

    #[test]
    fn test_default_knowledge_loads() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        assert!(engine.category_count() > 20);
        assert_eq!(engine.bot_predicate("name"), Some(BOT));
    }

    #[test]
    fn test_greeting_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let mut first = engine_in(&dir);
        let mut second = engine_in(&dir);
        let reply = first.respond("hello").unwrap();
        assert_eq!(reply, "Hi there! How are you today?");
        assert_eq!(second.respond("Hello!").unwrap(), reply);
        assert_eq!(first.respond("hi").unwrap(), reply);
    }

    #[test]
    fn test_wildcards_and_predicates() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);
        assert_eq!(engine.respond("my name is Kermit").unwrap(), "Nice to meet you, Kermit.");
        assert_eq!(engine.predicate("name"), Some("Kermit"));
        assert_eq!(engine.respond("what is my name").unwrap(), "Your name is Kermit.");
        assert_eq!(engine.respond("call me Fozzie Bear").unwrap(), "Nice to meet you, Fozzie Bear.");
    }

    #[test]
    fn test_bot_name_in_replies() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);
        let reply = engine.respond("what is your name").unwrap();
        assert!(reply.contains(BOT), "{}", reply);
    }

    #[test]
    fn test_underscore_beats_exact_word() {
        let mut engine = AimlEngine::with_default_knowledge(BOT, "unused.brain").unwrap();
        engine
            .learn(
                "<category><pattern>_ BANANA</pattern><template>wild</template></category>\
                 <category><pattern>RED BANANA</pattern><template>exact</template></category>",
            )
            .unwrap();
        assert_eq!(engine.respond("red banana").unwrap(), "wild");
    }

    #[test]
    fn test_unmatched_and_empty_input_fall_back() {
        let mut engine = AimlEngine::with_default_knowledge(BOT, "unused.brain").unwrap();
        assert_eq!(engine.respond("").unwrap(), FALLBACK_REPLY);
        assert_eq!(engine.respond("?!").unwrap(), FALLBACK_REPLY);
    }

    #[test]
    fn test_multiple_sentences_are_answered_in_order() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);
        let reply = engine.respond("hello. my name is Gonzo").unwrap();
        assert_eq!(reply, "Hi there! How are you today? Nice to meet you, Gonzo.");
    }

    #[test]
    fn test_runaway_srai_is_an_error() {
        let mut engine = AimlEngine::with_default_knowledge(BOT, "unused.brain").unwrap();
        engine
            .learn("<category><pattern>LOOP</pattern><template><srai>LOOP</srai></template></category>")
            .unwrap();
        assert!(engine.respond("loop").is_err());
    }

    #[test]
    fn test_malformed_template_is_rejected() {
        let mut engine = AimlEngine::with_default_knowledge(BOT, "unused.brain").unwrap();
        let before = engine.category_count();
        let err = engine
            .learn("<category><pattern>BROKEN</pattern><template><think>oops</template></category>")
            .unwrap_err();
        assert!(format!("{:#}", err).contains("malformed AIML"), "{:#}", err);
        assert_eq!(engine.category_count(), before);
    }

    #[test]
    fn test_single_quoted_attributes() {
        let mut engine = AimlEngine::with_default_knowledge(BOT, "unused.brain").unwrap();
        engine
            .learn(
                "<aiml><category><pattern>PICK * AND *</pattern><template><star index='2'/></template></category>\
                 <category><pattern>WHO IS MY FRIEND</pattern><template><get name='name'/></template></category></aiml>",
            )
            .unwrap();
        assert_eq!(engine.respond("pick apples and pears").unwrap(), "pears");
        assert_eq!(engine.respond("who is my friend").unwrap(), "friend");
    }

    #[test]
    fn test_cdata_and_entities_in_templates() {
        let mut engine = AimlEngine::with_default_knowledge(BOT, "unused.brain").unwrap();
        let added = engine
            .learn(
                "<?xml version=\"1.0\"?>\
                 <aiml><topic name=\"FOOD\">\
                 <category><pattern>RECIPE</pattern><template><![CDATA[Salt & <pepper>]]></template></category>\
                 </topic>\
                 <category><pattern>COMPARE</pattern><template>1 &lt; 2 &amp; 3 &gt; 2</template></category></aiml>",
            )
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(engine.respond("recipe").unwrap(), "Salt & <pepper>");
        assert_eq!(engine.respond("compare").unwrap(), "1 < 2 & 3 > 2");
    }

    #[tokio::test]
    async fn test_bootstrap_creates_brain_on_first_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("alice.brain");
        let engine = AimlEngine::bootstrap(BOT, &path).await.unwrap();
        assert!(path.exists());
        assert_eq!(engine.brain_path(), path.as_path());

        let saved: Brain = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(&saved, engine.brain());
    }

    #[tokio::test]
    async fn test_learned_predicates_survive_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alice.brain");

        let mut engine = AimlEngine::bootstrap(BOT, &path).await.unwrap();
        engine.respond("my name is Scooter").unwrap();
        engine.persist().await.unwrap();

        let mut restarted = AimlEngine::bootstrap("<@111111111111111111>", &path).await.unwrap();
        assert_eq!(restarted.respond("what is my name").unwrap(), "Your name is Scooter.");
        assert_eq!(restarted.bot_predicate("name"), Some("<@111111111111111111>"));
    }

    #[tokio::test]
    async fn test_corrupt_brain_fails_bootstrap() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alice.brain");
        std::fs::write(&path, b"not json").unwrap();
        let err = AimlEngine::bootstrap(BOT, &path).await.err().unwrap();
        assert!(format!("{:#}", err).contains("corrupt"));
    }

    #[tokio::test]
    async fn test_reset_forgets_and_rewrites_brain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alice.brain");

        let mut engine = AimlEngine::bootstrap(BOT, &path).await.unwrap();
        engine.respond("my name is Beaker").unwrap();
        engine.persist().await.unwrap();

        engine.reset().await.unwrap();
        assert_eq!(engine.predicate("name"), Some("friend"));
        assert!(path.exists());
        assert_eq!(engine.respond("hello").unwrap(), "Hi there! How are you today?");
    }

    #[tokio::test]
    async fn test_reset_without_brain_file_fails() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);
        let err = engine.reset().await.unwrap_err();
        assert!(err.to_string().contains("Could not delete brain file"));
    }
}
