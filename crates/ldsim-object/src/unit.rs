//! Unit source compiler.
//!
//! A unit is a line-oriented text file: `extern` declarations, `section`
//! directives opening code/data sections, labels defining symbols, and emit
//! directives (`db`, `dd`, `ascii`, `ref`). Compilation is pure and
//! deterministic; the same source always yields a structurally equal
//! [`Object`].

use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::{
    Object, RelocKind, Relocation, Section, SectionKind, Symbol, SymbolKind, SLOT_SIZE,
};
use crate::{CompileError, Result};

/// Compile one source unit into a relocatable object.
///
/// `name` identifies the unit (the CLI passes the source file stem). A `ref`
/// to a name that is neither labeled in the unit nor declared with `extern`
/// fails with [`CompileError::UndeclaredReference`]; declared-but-undefined
/// referenced names become `Undefined` symbol entries.
pub fn compile(name: &str, source: &str) -> Result<Object> {
    let mut unit = UnitBuilder::default();

    for (idx, raw_line) in source.lines().enumerate() {
        let line = idx + 1;
        let text = strip_comment(raw_line).trim();
        if text.is_empty() {
            continue;
        }
        unit.parse_line(line, text)?;
    }

    unit.finish(name)
}

#[derive(Default)]
struct UnitBuilder {
    sections: Vec<Section>,
    current: Option<usize>,
    /// Insertion-ordered label records: (name, section, offset).
    labels: Vec<(String, usize, u64)>,
    declared: FxHashSet<String>,
    relocations: Vec<Relocation>,
}

impl UnitBuilder {
    fn parse_line(&mut self, line: usize, text: &str) -> Result<()> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let head = tokens[0];

        if let Some(label) = head.strip_suffix(':') {
            if tokens.len() != 1 || label.is_empty() {
                return Err(syntax(line, "malformed label"));
            }
            return self.add_label(line, label);
        }

        match head {
            "extern" => {
                let sym = expect_one_operand(line, &tokens)?;
                self.declared.insert(sym.to_string());
                Ok(())
            }
            "section" => {
                let kind = match expect_one_operand(line, &tokens)? {
                    "code" => SectionKind::Code,
                    "data" => SectionKind::Data,
                    other => {
                        return Err(syntax(line, &format!("unknown section kind '{other}'")));
                    }
                };
                self.sections.push(Section { kind, bytes: Vec::new() });
                self.current = Some(self.sections.len() - 1);
                Ok(())
            }
            "db" => {
                if tokens.len() < 2 {
                    return Err(syntax(line, "db needs at least one byte"));
                }
                let mut bytes = Vec::with_capacity(tokens.len() - 1);
                for tok in &tokens[1..] {
                    bytes.push(parse_byte(line, tok)?);
                }
                self.emit(line, &bytes)
            }
            "dd" => {
                let word = parse_u32(line, expect_one_operand(line, &tokens)?)?;
                self.emit(line, &word.to_le_bytes())
            }
            "ascii" => {
                let rest = text["ascii".len()..].trim();
                let bytes = parse_quoted(line, rest)?;
                self.emit(line, &bytes)
            }
            "ref" => {
                if tokens.len() != 3 {
                    return Err(syntax(line, "ref needs a kind and a symbol"));
                }
                let kind = match tokens[1] {
                    "abs" => RelocKind::Absolute,
                    "rel" => RelocKind::PcRelative,
                    "got" => RelocKind::GotRelative,
                    other => {
                        return Err(syntax(line, &format!("unknown ref kind '{other}'")));
                    }
                };
                let section = self.open_section(line)?;
                let offset = self.sections[section].bytes.len() as u64;
                self.relocations.push(Relocation {
                    section,
                    offset,
                    symbol: tokens[2].to_string(),
                    kind,
                });
                self.emit(line, &[0; SLOT_SIZE])
            }
            other => Err(CompileError::UnknownDirective {
                line,
                directive: other.to_string(),
            }),
        }
    }

    fn add_label(&mut self, line: usize, label: &str) -> Result<()> {
        if self.labels.iter().any(|(name, _, _)| name == label) {
            return Err(CompileError::DuplicateSymbol(label.to_string()));
        }
        let section = self.open_section(line)?;
        let offset = self.sections[section].bytes.len() as u64;
        self.labels.push((label.to_string(), section, offset));
        Ok(())
    }

    fn open_section(&self, line: usize) -> Result<usize> {
        self.current
            .ok_or_else(|| syntax(line, "no section is open"))
    }

    fn emit(&mut self, line: usize, bytes: &[u8]) -> Result<()> {
        let section = self.open_section(line)?;
        self.sections[section].bytes.extend_from_slice(bytes);
        Ok(())
    }

    fn finish(self, name: &str) -> Result<Object> {
        // Every reference must resolve to a label or an extern declaration.
        for reloc in &self.relocations {
            let labeled = self.labels.iter().any(|(n, _, _)| n == &reloc.symbol);
            if !labeled && !self.declared.contains(&reloc.symbol) {
                return Err(CompileError::UndeclaredReference(reloc.symbol.clone()));
            }
        }

        let mut symbols: FxHashMap<String, Symbol> = FxHashMap::default();
        for (label, section, offset) in &self.labels {
            symbols.insert(
                label.clone(),
                Symbol {
                    name: label.clone(),
                    kind: SymbolKind::Defined {
                        section: *section,
                        offset: *offset,
                    },
                    size: self.label_size(*section, *offset),
                },
            );
        }
        for reloc in &self.relocations {
            if !symbols.contains_key(&reloc.symbol) {
                symbols.insert(
                    reloc.symbol.clone(),
                    Symbol {
                        name: reloc.symbol.clone(),
                        kind: SymbolKind::Undefined,
                        size: 0,
                    },
                );
            }
        }

        Ok(Object {
            name: name.to_string(),
            sections: self.sections,
            symbols,
            relocations: self.relocations,
        })
    }

    /// A label extends to the next label in the same section, or the
    /// section's end.
    fn label_size(&self, section: usize, offset: u64) -> u64 {
        let next = self
            .labels
            .iter()
            .filter(|(_, s, o)| *s == section && *o > offset)
            .map(|(_, _, o)| *o)
            .min();
        next.unwrap_or(self.sections[section].bytes.len() as u64) - offset
    }
}

fn syntax(line: usize, message: &str) -> CompileError {
    CompileError::Syntax {
        line,
        message: message.to_string(),
    }
}

fn expect_one_operand<'a>(line: usize, tokens: &[&'a str]) -> Result<&'a str> {
    if tokens.len() != 2 {
        return Err(syntax(line, "expected exactly one operand"));
    }
    Ok(tokens[1])
}

fn parse_byte(line: usize, tok: &str) -> Result<u8> {
    let value = parse_u32(line, tok)?;
    u8::try_from(value).map_err(|_| syntax(line, &format!("byte value '{tok}' out of range")))
}

fn parse_u32(line: usize, tok: &str) -> Result<u32> {
    let parsed = if let Some(hex) = tok.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        tok.parse()
    };
    parsed.map_err(|_| syntax(line, &format!("invalid number '{tok}'")))
}

fn parse_quoted(line: usize, rest: &str) -> Result<Vec<u8>> {
    let inner = rest
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| syntax(line, "ascii needs a double-quoted string"))?;
    Ok(inner.as_bytes().to_vec())
}

/// Strip a `#` comment, ignoring `#` inside a double-quoted string.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUM_UNIT: &str = r#"
# toy sum_and_mul unit
extern mul

section code
sum_and_mul:
    db 0x55 0x89
    ref rel mul
    db 0xc3
"#;

    #[test]
    fn test_compile_is_deterministic() {
        let a = compile("sum", SUM_UNIT).unwrap();
        let b = compile("sum", SUM_UNIT).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_compile_sum_unit() {
        let obj = compile("sum", SUM_UNIT).unwrap();
        assert_eq!(obj.sections.len(), 1);
        assert_eq!(obj.sections[0].kind, SectionKind::Code);
        // 2 prologue bytes + 4-byte slot + 1 byte
        assert_eq!(obj.sections[0].bytes.len(), 7);
        assert_eq!(&obj.sections[0].bytes[2..6], &[0, 0, 0, 0]);

        let sym = obj.symbol("sum_and_mul").unwrap();
        assert_eq!(sym.kind, SymbolKind::Defined { section: 0, offset: 0 });
        assert_eq!(sym.size, 7);
        assert_eq!(obj.symbol("mul").unwrap().kind, SymbolKind::Undefined);

        assert_eq!(obj.relocations.len(), 1);
        assert_eq!(obj.relocations[0].offset, 2);
        assert_eq!(obj.relocations[0].kind, RelocKind::PcRelative);
    }

    #[test]
    fn test_undeclared_reference_fails() {
        let src = "section code\nstart:\n    ref rel missing\n";
        assert_eq!(
            compile("bad", src).unwrap_err(),
            CompileError::UndeclaredReference("missing".to_string())
        );
    }

    #[test]
    fn test_forward_reference_to_label_is_allowed() {
        let src = "section code\nstart:\n    ref rel helper\nhelper:\n    db 0xc3\n";
        let obj = compile("fwd", src).unwrap();
        assert!(obj.defines("helper"));
        assert_eq!(obj.symbol("helper").unwrap().size, 1);
    }

    #[test]
    fn test_duplicate_label_fails() {
        let src = "section code\nx:\n    db 1\nx:\n";
        assert_eq!(
            compile("dup", src).unwrap_err(),
            CompileError::DuplicateSymbol("x".to_string())
        );
    }

    #[test]
    fn test_emit_outside_section_fails() {
        assert!(matches!(
            compile("bad", "db 1\n").unwrap_err(),
            CompileError::Syntax { line: 1, .. }
        ));
    }

    #[test]
    fn test_unknown_directive() {
        assert!(matches!(
            compile("bad", "section code\nfrobnicate 1\n").unwrap_err(),
            CompileError::UnknownDirective { line: 2, .. }
        ));
    }

    #[test]
    fn test_data_directives() {
        let src = "section data\ngreeting:\n    ascii \"hi # there\"\nanswer:\n    dd 0x01020304\n";
        let obj = compile("data", src).unwrap();
        let bytes = &obj.sections[0].bytes;
        assert_eq!(&bytes[..10], b"hi # there");
        assert_eq!(&bytes[10..], &[4, 3, 2, 1]);
        assert_eq!(obj.symbol("greeting").unwrap().size, 10);
        assert_eq!(obj.symbol("answer").unwrap().size, 4);
    }

    #[test]
    fn test_sections_index_in_order() {
        let src = "section code\nf:\n    db 1\nsection data\nd:\n    db 2\n";
        let obj = compile("two", src).unwrap();
        assert_eq!(obj.sections.len(), 2);
        assert_eq!(
            obj.symbol("d").unwrap().kind,
            SymbolKind::Defined { section: 1, offset: 0 }
        );
    }
}
