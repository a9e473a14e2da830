use crate::engine::EngineKind;

/// How an engine presents itself in embeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub kind: EngineKind,
    /// Appended under every embed reply, e.g. `*--ALICE*`.
    pub signature: &'static str,
    pub description_title: &'static str,
    pub description: &'static str,
}

impl Persona {
    /// Body of a `speak` embed.
    pub fn sign(&self, reply: &str) -> String {
        format!("{}\n*--{}*", reply, self.signature)
    }
}

const ALICE: Persona = Persona {
    kind: EngineKind::Alice,
    signature: "ALICE",
    description_title: "What is ALICE?",
    description: "**ALICE** is a chatter bot inspired by **ELIZA**. It has won multiple \
Loebner Prize awards, but has not been able to pass the Turing Test. \
It is written in AIML (Artificial Intelligence Markup Language) and is open source.\n\
More at the Wikipedia article:\n\
https://en.wikipedia.org/wiki/Artificial_Linguistic_Internet_Computer_Entity\n\
This ALICE remembers what you tell it about yourself between restarts.",
};

const ELIZA: Persona = Persona {
    kind: EngineKind::Eliza,
    signature: "Eliza",
    description_title: "What is ELIZA?",
    description: "**ELIZA** is an early natural language processing computer program. \
It attempts to play the role of a therapist by reflecting the user's statements back at them.\n\
More at the Wikipedia article:\n\
https://en.wikipedia.org/wiki/ELIZA\n\
This ELIZA runs the classic DOCTOR script.",
};

#[derive(Debug, Clone)]
pub struct PersonaManager {
    personas: [Persona; 2],
}

impl PersonaManager {
    pub fn new() -> Self {
        PersonaManager {
            personas: [ALICE, ELIZA],
        }
    }

    pub fn get_persona(&self, kind: EngineKind) -> &Persona {
        match kind {
            EngineKind::Alice => &self.personas[0],
            EngineKind::Eliza => &self.personas[1],
        }
    }

    pub fn list_personas(&self) -> &[Persona] {
        &self.personas
    }
}

impl Default for PersonaManager {
    fn default() -> Self {
        Self::new()
    }
}
