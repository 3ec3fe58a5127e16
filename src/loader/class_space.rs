// Class Space - Metadata of the classes resolvable by a transaction
//
// The replacement of runtime reflection: the verifier reports, for every
// instrumented jar, the classes it defines, their superclass and their
// fields. The class space answers subclassing and field-layout questions
// for the whole dependency closure of a classpath.

use crate::types::ledger;
use crate::types::FieldId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared field of a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,

    /// Type tag: one of the primitive tags (boolean, int, long, biginteger,
    /// string), "enum:<class>", or a class name for reference fields
    pub field_type: String,

    /// Final fields are written only by the creating transaction
    pub is_final: bool,

    /// Transient fields are never persisted
    pub is_transient: bool,
}

impl FieldDef {
    pub fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            is_final: false,
            is_transient: false,
        }
    }

    pub fn final_field(name: &str, field_type: &str) -> Self {
        Self {
            is_final: true,
            ..Self::new(name, field_type)
        }
    }

    /// Reference fields are lazy: they are only resolved when traversed
    pub fn is_lazy(&self) -> bool {
        !matches!(
            self.field_type.as_str(),
            "boolean" | "int" | "long" | "biginteger" | "string"
        ) && !self.field_type.starts_with("enum:")
    }
}

/// Declared class of a jar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub superclass: Option<String>,
    pub fields: Vec<FieldDef>,
}

impl ClassDef {
    pub fn new(name: &str, superclass: Option<&str>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.to_string(),
            superclass: superclass.map(|s| s.to_string()),
            fields,
        }
    }
}

/// The classes resolvable by a transaction: the union of the classes of its
/// classpath jar and of the transitive closure of its dependencies. The
/// first definition of a name wins, like the ordering of a classpath.
#[derive(Debug, Clone, Default)]
pub struct ClassSpace {
    classes: HashMap<String, ClassDef>,
}

impl ClassSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the classes of one jar; names already defined are kept
    pub fn add_jar_classes(&mut self, defs: Vec<ClassDef>) {
        for def in defs {
            self.classes.entry(def.name.clone()).or_insert(def);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// Walks the superclass chain of `class` looking for `ancestor`
    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class.to_string());
        let mut steps = 0;

        while let Some(name) = current {
            if name == ancestor {
                return true;
            }

            // a malformed hierarchy must not loop forever
            steps += 1;
            if steps > self.classes.len() + 1 {
                return false;
            }

            current = self
                .classes
                .get(&name)
                .and_then(|def| def.superclass.clone());
        }

        false
    }

    /// The non-transient instance fields of a class, walking superclasses,
    /// each keyed by the class that declares it
    pub fn fields_of(&self, class: &str) -> Vec<(FieldId, FieldDef)> {
        let mut fields = Vec::new();
        let mut current = Some(class.to_string());
        let mut steps = 0;

        while let Some(name) = current {
            let def = match self.classes.get(&name) {
                Some(def) => def,
                None => break,
            };

            for field in &def.fields {
                if !field.is_transient {
                    fields.push((FieldId::new(&name, &field.name), field.clone()));
                }
            }

            steps += 1;
            if steps > self.classes.len() + 1 {
                break;
            }

            current = def.superclass.clone();
        }

        fields
    }

    pub fn is_contract(&self, class: &str) -> bool {
        self.is_subclass_of(class, ledger::CONTRACT_CLASS)
    }

    pub fn is_red_green_contract(&self, class: &str) -> bool {
        self.is_subclass_of(class, ledger::RED_GREEN_CONTRACT_CLASS)
    }

    pub fn is_externally_owned_account(&self, class: &str) -> bool {
        self.is_subclass_of(class, ledger::EOA_CLASS)
            || self.is_subclass_of(class, ledger::RED_GREEN_EOA_CLASS)
    }

    pub fn is_red_green_externally_owned_account(&self, class: &str) -> bool {
        self.is_subclass_of(class, ledger::RED_GREEN_EOA_CLASS)
    }

    pub fn is_event(&self, class: &str) -> bool {
        self.is_subclass_of(class, ledger::EVENT_CLASS)
    }
}
