//! Field directories: the cached mapping from a struct shape to its CBOR
//! layout.
//!
//! Shapes are emitted by the derive macros as static descriptors; a mode
//! turns a shape into a [`FieldDirectory`] once and caches it by `TypeId`.

use crate::{
    constants::{MAJOR_NEG, MAJOR_POS, MAJOR_STR},
    error::{Error, Result},
    options::SortMode,
    wire::write_head,
};
use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// Static description of one struct field, as written by the derive macro.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    /// raw `cbor` annotation string, e.g. `"name,omitempty"`
    pub cbor_tag: Option<&'static str>,
    /// raw `json` annotation string, used when no `cbor` annotation is given
    pub json_tag: Option<&'static str>,
    /// shape of the embedded struct to lift into this one
    pub flatten: Option<fn() -> &'static TypeShape>,
}

/// Static description of a struct, as written by the derive macro.
#[derive(Debug, Clone, Copy)]
pub struct TypeShape {
    pub name: &'static str,
    /// encode the whole struct as an array in declared field order
    pub to_array: bool,
    pub fields: &'static [FieldSpec],
}

/// The CBOR key under which a field is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey {
    Text(&'static str),
    Int(i64),
}

/// Parsed form of the comma-separated annotation grammar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TagOptions<'a> {
    pub ignored: bool,
    pub rename: Option<&'a str>,
    pub omit_empty: bool,
    pub key_as_int: bool,
    pub to_array: bool,
}

/// Parse `"name,omitempty,keyasint"`; `-` alone drops the field. Unknown
/// tokens are skipped so annotations written for other codecs stay usable.
pub(crate) fn parse_tag(tag: &str) -> TagOptions<'_> {
    if tag == "-" {
        return TagOptions {
            ignored: true,
            ..TagOptions::default()
        };
    }
    let mut opts = TagOptions::default();
    for (idx, token) in tag.split(',').enumerate() {
        if idx == 0 {
            if !token.is_empty() {
                opts.rename = Some(token);
            }
            continue;
        }
        match token {
            "omitempty" => opts.omit_empty = true,
            "keyasint" => opts.key_as_int = true,
            "toarray" => opts.to_array = true,
            _ => {}
        }
    }
    opts
}

/// One resolved field of a directory.
#[derive(Debug, Clone)]
pub struct Field {
    /// accessor path through flattened shapes, in declared-field indices
    pub path: Vec<u32>,
    pub key: FieldKey,
    /// the CBOR encoding of `key`
    pub encoded_key: Vec<u8>,
    pub omit_empty: bool,
}

impl Field {
    /// Display name of the key, for breadcrumbs.
    pub fn key_name(&self) -> String {
        match self.key {
            FieldKey::Text(s) => s.to_owned(),
            FieldKey::Int(i) => i.to_string(),
        }
    }
}

/// Per-type field layout: declared order, the two canonical orders, and the
/// decode lookup index.
#[derive(Debug)]
pub struct FieldDirectory {
    pub type_name: &'static str,
    pub to_array: bool,
    fields: Vec<Field>,
    len_first: Vec<u32>,
    bytewise: Vec<u32>,
    exact: HashMap<&'static str, u32>,
    /// lowercased name to unique field; `None` marks an ambiguous fold
    folded: HashMap<String, Option<u32>>,
    ints: HashMap<i64, u32>,
}

struct Candidate {
    path: Vec<u32>,
    depth: usize,
    tagged: bool,
    key: FieldKey,
    omit_empty: bool,
}

fn collect(
    shape: &'static TypeShape,
    prefix: &[u32],
    depth: usize,
    out: &mut Vec<Candidate>,
    to_array: &mut bool,
) -> Result<()> {
    if depth > 64 {
        return Err(Error::FieldTag {
            type_name: shape.name,
            field: "",
            message: "flattened shapes nest too deeply",
        });
    }
    for (idx, spec) in shape.fields.iter().enumerate() {
        let mut path = prefix.to_vec();
        path.push(idx as u32);
        let raw = spec.cbor_tag.or(spec.json_tag);
        let opts = raw.map(parse_tag).unwrap_or_default();
        if opts.ignored {
            continue;
        }
        if opts.to_array {
            *to_array = true;
        }
        if let Some(inner) = spec.flatten {
            collect(inner(), &path, depth + 1, out, to_array)?;
            continue;
        }
        let key = if opts.key_as_int {
            let name = opts.rename.unwrap_or(spec.name);
            let int = name.parse::<i64>().map_err(|_| Error::FieldTag {
                type_name: shape.name,
                field: spec.name,
                message: "keyasint requires an integer name",
            })?;
            FieldKey::Int(int)
        } else {
            FieldKey::Text(opts.rename.unwrap_or(spec.name))
        };
        out.push(Candidate {
            path,
            depth,
            tagged: opts.rename.is_some(),
            key,
            omit_empty: opts.omit_empty,
        });
    }
    Ok(())
}

fn encode_key(key: FieldKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    match key {
        FieldKey::Int(i) if i >= 0 => {
            write_head(&mut out, MAJOR_POS, i as u64);
        }
        FieldKey::Int(i) => {
            write_head(&mut out, MAJOR_NEG, (-1 - i) as u64);
        }
        FieldKey::Text(s) => {
            write_head(&mut out, MAJOR_STR, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
    }
    out
}

impl FieldDirectory {
    pub fn build(shape: &'static TypeShape) -> Result<Self> {
        let mut to_array = shape.to_array;
        let mut candidates = Vec::new();
        collect(shape, &[], 0, &mut candidates, &mut to_array)?;

        // embedded-field dominance: per key, the shallowest depth wins; at
        // equal depth a single annotated field dominates; remaining ties are
        // ambiguous and every contender is dropped
        let mut fields: Vec<Field> = Vec::new();
        let mut taken: Vec<bool> = vec![false; candidates.len()];
        for i in 0..candidates.len() {
            if taken[i] {
                continue;
            }
            let key = candidates[i].key;
            let group: Vec<usize> = (i..candidates.len())
                .filter(|&j| candidates[j].key == key)
                .collect();
            for &j in &group {
                taken[j] = true;
            }
            let min_depth = group.iter().map(|&j| candidates[j].depth).min().unwrap();
            let at_min: Vec<usize> = group
                .iter()
                .copied()
                .filter(|&j| candidates[j].depth == min_depth)
                .collect();
            let winner = if at_min.len() == 1 {
                Some(at_min[0])
            } else {
                let tagged: Vec<usize> = at_min
                    .iter()
                    .copied()
                    .filter(|&j| candidates[j].tagged)
                    .collect();
                if tagged.len() == 1 {
                    Some(tagged[0])
                } else {
                    None
                }
            };
            if let Some(w) = winner {
                let c = &candidates[w];
                fields.push(Field {
                    path: c.path.clone(),
                    key: c.key,
                    encoded_key: encode_key(c.key),
                    omit_empty: c.omit_empty,
                });
            }
        }

        let mut len_first: Vec<u32> = (0..fields.len() as u32).collect();
        len_first.sort_by(|&a, &b| {
            let (ka, kb) = (&fields[a as usize].encoded_key, &fields[b as usize].encoded_key);
            ka.len().cmp(&kb.len()).then_with(|| ka.cmp(kb))
        });
        let mut bytewise: Vec<u32> = (0..fields.len() as u32).collect();
        bytewise.sort_by(|&a, &b| {
            fields[a as usize]
                .encoded_key
                .cmp(&fields[b as usize].encoded_key)
        });

        let mut exact = HashMap::new();
        let mut folded: HashMap<String, Option<u32>> = HashMap::new();
        let mut ints = HashMap::new();
        for (idx, field) in fields.iter().enumerate() {
            match field.key {
                FieldKey::Text(name) => {
                    exact.insert(name, idx as u32);
                    folded
                        .entry(name.to_lowercase())
                        .and_modify(|e| *e = None)
                        .or_insert(Some(idx as u32));
                }
                FieldKey::Int(i) => {
                    ints.insert(i, idx as u32);
                }
            }
        }

        Ok(Self {
            type_name: shape.name,
            to_array,
            fields,
            len_first,
            bytewise,
            exact,
            folded,
            ints,
        })
    }

    /// Fields in declared order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Fields in the order required by the given sort setting.
    pub fn sorted(&self, sort: SortMode) -> impl Iterator<Item = &Field> + '_ {
        let order: Option<&[u32]> = match sort {
            SortMode::None => None,
            SortMode::LengthFirst => Some(&self.len_first),
            SortMode::BytewiseLexical => Some(&self.bytewise),
        };
        (0..self.fields.len()).map(move |i| match order {
            Some(o) => &self.fields[o[i] as usize],
            None => &self.fields[i],
        })
    }

    /// Look up a text key: exact match first, then the case-insensitive
    /// match if it is unique.
    pub fn by_text_key(&self, name: &str) -> Option<(usize, &Field)> {
        if let Some(&idx) = self.exact.get(name) {
            return Some((idx as usize, &self.fields[idx as usize]));
        }
        match self.folded.get(&name.to_lowercase()) {
            Some(Some(idx)) => Some((*idx as usize, &self.fields[*idx as usize])),
            _ => None,
        }
    }

    pub fn by_int_key(&self, key: i64) -> Option<(usize, &Field)> {
        self.ints
            .get(&key)
            .map(|&idx| (idx as usize, &self.fields[idx as usize]))
    }
}

/// Type-keyed directory cache held by a mode. Population is write-through on
/// miss: the losing writer of a race adopts the already-published entry.
#[derive(Debug, Default)]
pub(crate) struct DirectoryCache {
    map: RwLock<HashMap<TypeId, Arc<FieldDirectory>>>,
}

impl DirectoryCache {
    pub fn get(
        &self,
        id: TypeId,
        shape: fn() -> &'static TypeShape,
    ) -> Result<Arc<FieldDirectory>> {
        {
            let read = self.map.read().unwrap_or_else(|e| e.into_inner());
            if let Some(dir) = read.get(&id) {
                return Ok(dir.clone());
            }
        }
        let built = Arc::new(FieldDirectory::build(shape())?);
        let mut write = self.map.write().unwrap_or_else(|e| e.into_inner());
        Ok(write.entry(id).or_insert(built).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_grammar() {
        assert_eq!(
            parse_tag("-"),
            TagOptions {
                ignored: true,
                ..TagOptions::default()
            }
        );
        let t = parse_tag("renamed,omitempty");
        assert_eq!(t.rename, Some("renamed"));
        assert!(t.omit_empty && !t.key_as_int && !t.ignored);
        let t = parse_tag(",omitempty,keyasint");
        assert_eq!(t.rename, None);
        assert!(t.omit_empty && t.key_as_int);
        let t = parse_tag("1,keyasint");
        assert_eq!(t.rename, Some("1"));
        let t = parse_tag(",toarray");
        assert!(t.to_array);
        // unknown tokens are skipped
        let t = parse_tag("x,string");
        assert_eq!(t.rename, Some("x"));
        assert!(!t.omit_empty);
    }

    static PLAIN_FIELDS: [FieldSpec; 3] = [
        FieldSpec {
            name: "alpha",
            cbor_tag: None,
            json_tag: None,
            flatten: None,
        },
        FieldSpec {
            name: "b",
            cbor_tag: Some("bee,omitempty"),
            json_tag: None,
            flatten: None,
        },
        FieldSpec {
            name: "num",
            cbor_tag: Some("3,keyasint"),
            json_tag: None,
            flatten: None,
        },
    ];
    static PLAIN: TypeShape = TypeShape {
        name: "Plain",
        to_array: false,
        fields: &PLAIN_FIELDS,
    };

    #[test]
    fn directory_views() {
        let dir = FieldDirectory::build(&PLAIN).unwrap();
        assert!(!dir.to_array);
        let keys: Vec<_> = dir.fields().iter().map(|f| f.key).collect();
        assert_eq!(
            keys,
            vec![
                FieldKey::Text("alpha"),
                FieldKey::Text("bee"),
                FieldKey::Int(3)
            ]
        );
        assert!(dir.fields()[1].omit_empty);
        // the integer key 3 encodes shorter than any text key
        let sorted: Vec<_> = dir
            .sorted(crate::options::SortMode::LengthFirst)
            .map(|f| f.key)
            .collect();
        assert_eq!(
            sorted,
            vec![
                FieldKey::Int(3),
                FieldKey::Text("bee"),
                FieldKey::Text("alpha")
            ]
        );
        // bytewise order: 0x03 < 0x63"bee" < 0x65"alpha"
        let sorted: Vec<_> = dir
            .sorted(crate::options::SortMode::BytewiseLexical)
            .map(|f| f.key)
            .collect();
        assert_eq!(
            sorted,
            vec![
                FieldKey::Int(3),
                FieldKey::Text("bee"),
                FieldKey::Text("alpha")
            ]
        );
        assert_eq!(dir.by_text_key("bee").unwrap().1.key, FieldKey::Text("bee"));
        assert_eq!(dir.by_text_key("BEE").unwrap().1.key, FieldKey::Text("bee"));
        assert!(dir.by_text_key("nope").is_none());
        assert_eq!(dir.by_int_key(3).unwrap().1.key, FieldKey::Int(3));
    }

    static INNER_FIELDS: [FieldSpec; 2] = [
        FieldSpec {
            name: "shared",
            cbor_tag: None,
            json_tag: None,
            flatten: None,
        },
        FieldSpec {
            name: "inner_only",
            cbor_tag: None,
            json_tag: None,
            flatten: None,
        },
    ];
    static INNER: TypeShape = TypeShape {
        name: "Inner",
        to_array: false,
        fields: &INNER_FIELDS,
    };
    fn inner_shape() -> &'static TypeShape {
        &INNER
    }
    static OUTER_FIELDS: [FieldSpec; 2] = [
        FieldSpec {
            name: "shared",
            cbor_tag: None,
            json_tag: None,
            flatten: None,
        },
        FieldSpec {
            name: "emb",
            cbor_tag: None,
            json_tag: None,
            flatten: Some(inner_shape),
        },
    ];
    static OUTER: TypeShape = TypeShape {
        name: "Outer",
        to_array: false,
        fields: &OUTER_FIELDS,
    };

    #[test]
    fn shallower_field_wins() {
        let dir = FieldDirectory::build(&OUTER).unwrap();
        let keys: Vec<_> = dir.fields().iter().map(|f| f.key).collect();
        assert_eq!(
            keys,
            vec![FieldKey::Text("shared"), FieldKey::Text("inner_only")]
        );
        // the shallow field keeps its one-step path
        assert_eq!(dir.by_text_key("shared").unwrap().1.path, vec![0]);
        assert_eq!(dir.by_text_key("inner_only").unwrap().1.path, vec![1, 1]);
    }

    static AMB_A_FIELDS: [FieldSpec; 1] = [FieldSpec {
        name: "x",
        cbor_tag: None,
        json_tag: None,
        flatten: None,
    }];
    static AMB_A: TypeShape = TypeShape {
        name: "A",
        to_array: false,
        fields: &AMB_A_FIELDS,
    };
    fn amb_a() -> &'static TypeShape {
        &AMB_A
    }
    static AMB_B_FIELDS: [FieldSpec; 1] = [FieldSpec {
        name: "x",
        cbor_tag: None,
        json_tag: None,
        flatten: None,
    }];
    static AMB_B: TypeShape = TypeShape {
        name: "B",
        to_array: false,
        fields: &AMB_B_FIELDS,
    };
    fn amb_b() -> &'static TypeShape {
        &AMB_B
    }
    static AMB_FIELDS: [FieldSpec; 2] = [
        FieldSpec {
            name: "a",
            cbor_tag: None,
            json_tag: None,
            flatten: Some(amb_a),
        },
        FieldSpec {
            name: "b",
            cbor_tag: None,
            json_tag: None,
            flatten: Some(amb_b),
        },
    ];
    static AMB: TypeShape = TypeShape {
        name: "Amb",
        to_array: false,
        fields: &AMB_FIELDS,
    };

    #[test]
    fn equal_depth_ties_are_dropped() {
        let dir = FieldDirectory::build(&AMB).unwrap();
        assert!(dir.fields().is_empty());
    }

    static TAGGED_B_FIELDS: [FieldSpec; 1] = [FieldSpec {
        name: "x",
        cbor_tag: Some("x"),
        json_tag: None,
        flatten: None,
    }];
    static TAGGED_B: TypeShape = TypeShape {
        name: "B",
        to_array: false,
        fields: &TAGGED_B_FIELDS,
    };
    fn tagged_b() -> &'static TypeShape {
        &TAGGED_B
    }
    static DOM_FIELDS: [FieldSpec; 2] = [
        FieldSpec {
            name: "a",
            cbor_tag: None,
            json_tag: None,
            flatten: Some(amb_a),
        },
        FieldSpec {
            name: "b",
            cbor_tag: None,
            json_tag: None,
            flatten: Some(tagged_b),
        },
    ];
    static DOM: TypeShape = TypeShape {
        name: "Dom",
        to_array: false,
        fields: &DOM_FIELDS,
    };

    #[test]
    fn annotated_field_dominates_at_equal_depth() {
        let dir = FieldDirectory::build(&DOM).unwrap();
        let keys: Vec<_> = dir.fields().iter().map(|f| f.key).collect();
        assert_eq!(keys, vec![FieldKey::Text("x")]);
        assert_eq!(dir.fields()[0].path, vec![1, 0]);
    }

    #[test]
    fn keyasint_requires_integer() {
        static BAD_FIELDS: [FieldSpec; 1] = [FieldSpec {
            name: "oops",
            cbor_tag: Some(",keyasint"),
            json_tag: None,
            flatten: None,
        }];
        static BAD: TypeShape = TypeShape {
            name: "Bad",
            to_array: false,
            fields: &BAD_FIELDS,
        };
        assert!(matches!(
            FieldDirectory::build(&BAD),
            Err(Error::FieldTag { .. })
        ));
    }

    #[test]
    fn json_fallback() {
        let dir = FieldDirectory::build({
            static F: [FieldSpec; 2] = [
                FieldSpec {
                    name: "a",
                    cbor_tag: Some("from_cbor"),
                    json_tag: Some("from_json"),
                    flatten: None,
                },
                FieldSpec {
                    name: "b",
                    cbor_tag: None,
                    json_tag: Some("json_name"),
                    flatten: None,
                },
            ];
            static S: TypeShape = TypeShape {
                name: "J",
                to_array: false,
                fields: &F,
            };
            &S
        })
        .unwrap();
        let keys: Vec<_> = dir.fields().iter().map(|f| f.key).collect();
        assert_eq!(
            keys,
            vec![FieldKey::Text("from_cbor"), FieldKey::Text("json_name")]
        );
    }
}
