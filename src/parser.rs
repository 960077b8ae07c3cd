/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use crate::ast::*;
use crate::errors::AssemblyError;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

// Derive the parser from our grammar file.
#[derive(Parser)]
#[grammar = "./grammar.pest"]
pub struct VelaParser;

// Main parsing function that takes the entire source code string.
pub fn parse_source(source: &str) -> Result<Vec<AssemblyLine>, AssemblyError> {
    let pairs = VelaParser::parse(Rule::program, source)
        .map_err(|e| AssemblyError::PestError(Box::new(e)))?;
    let mut ast = Vec::new();

    for line_pair in pairs
        .flatten()
        .filter(|p| p.as_rule() == Rule::line_content)
    {
        let line_number = line_pair.as_span().start_pos().line_col().0;
        let mut inner = line_pair.into_inner();
        let mut assembly_line = AssemblyLine {
            line_number,
            ..AssemblyLine::default()
        };

        // Check for a label first
        if let Some(pair) = inner.peek() {
            if pair.as_rule() == Rule::label {
                assembly_line.label = Some(
                    inner
                        .next()
                        .unwrap()
                        .into_inner()
                        .next()
                        .unwrap()
                        .as_str()
                        .to_string(),
                );
            }
        }

        // Then an instruction or a directive on the same line
        if let Some(pair) = inner.peek() {
            match pair.as_rule() {
                Rule::instruction => {
                    assembly_line.instruction = Some(build_instruction(
                        inner.next().unwrap().into_inner().next().unwrap(),
                    )?);
                }
                Rule::directive => {
                    assembly_line.directive = Some(build_directive(
                        inner.next().unwrap().into_inner().next().unwrap(),
                    )?);
                }
                _ => {}
            }
        }

        if assembly_line.label.is_some()
            || assembly_line.instruction.is_some()
            || assembly_line.directive.is_some()
        {
            ast.push(assembly_line);
        }
    }

    Ok(ast)
}

// ------------- operand builder helpers -------------

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

// Parse a decimal or 0x-prefixed literal, optionally negative. The
// accepted range is that of a 32-bit word, signed or unsigned.
fn build_literal(pair: Pair<Rule>) -> Result<i32, AssemblyError> {
    let line = line_of(&pair);
    let text = pair.as_str();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|_| AssemblyError::StructuralError {
        line,
        reason: format!("Invalid literal: {text}"),
    })?;
    let value = if negative { -magnitude } else { magnitude };

    if value < i32::MIN as i64 || value > u32::MAX as i64 {
        return Err(AssemblyError::StructuralError {
            line,
            reason: format!("Literal {text} does not fit in 32 bits"),
        });
    }
    Ok(value as u32 as i32)
}

// build a general purpose register from a pair
fn build_gpr(pair: Pair<Rule>) -> Result<Register, AssemblyError> {
    let line = line_of(&pair);
    let name = pair.as_str()[1..].to_ascii_lowercase();
    match name.as_str() {
        "sp" => Ok(Register::SP),
        "pc" => Ok(Register::PC),
        _ => {
            let index: u8 = name[1..].parse().map_err(|_| AssemblyError::StructuralError {
                line,
                reason: format!("Invalid register: %{name}"),
            })?;
            Register::from_index(index).ok_or_else(|| AssemblyError::StructuralError {
                line,
                reason: format!("Invalid register: %{name}"),
            })
        }
    }
}

// build a control/status register from a pair
fn build_csr(pair: Pair<Rule>) -> Result<Csr, AssemblyError> {
    match pair.as_str()[1..].to_ascii_lowercase().as_str() {
        "status" => Ok(Csr::Status),
        "handler" => Ok(Csr::Handler),
        "cause" => Ok(Csr::Cause),
        other => unreachable!("Unknown control register: {other}"),
    }
}

// build a literal-or-symbol operand from a `value` pair
fn build_value(pair: Pair<Rule>) -> Result<Operand, AssemblyError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::literal => Ok(Operand::Literal(build_literal(inner)?)),
        Rule::identifier => Ok(Operand::Symbol(inner.as_str().to_string())),
        _ => unreachable!("Unknown value rule: {:?}", inner.as_rule()),
    }
}

// ------------- instruction builder helpers -------------

fn build_two_gprs(pair: Pair<Rule>) -> Result<(Register, Register), AssemblyError> {
    let mut inner = pair.into_inner();
    let first = build_gpr(inner.next().unwrap())?;
    let second = build_gpr(inner.next().unwrap())?;
    Ok((first, second))
}

fn build_branch(pair: Pair<Rule>) -> Result<(Register, Register, Operand), AssemblyError> {
    let mut inner = pair.into_inner();
    let gpr1 = build_gpr(inner.next().unwrap())?;
    let gpr2 = build_gpr(inner.next().unwrap())?;
    let target = build_value(inner.next().unwrap())?;
    Ok((gpr1, gpr2, target))
}

// build and check operands for a load instruction
fn build_ld(pair: Pair<Rule>) -> Result<Instruction, AssemblyError> {
    let mut inner = pair.into_inner();
    let src = inner.next().unwrap().into_inner().next().unwrap();
    let dst = build_gpr(inner.next().unwrap())?;

    match src.as_rule() {
        Rule::immediate => {
            let operand = build_value(src.into_inner().next().unwrap())?;
            Ok(Instruction::LdImm(operand, dst))
        }
        Rule::mem_ind => {
            let mut parts = src.into_inner();
            let base = build_gpr(parts.next().unwrap())?;
            match parts.next() {
                Some(offset) => Ok(Instruction::LdRegIndOff(base, build_literal(offset)?, dst)),
                None => Ok(Instruction::LdRegInd(base, dst)),
            }
        }
        Rule::gpr => Ok(Instruction::LdRegDir(build_gpr(src)?, dst)),
        Rule::value => Ok(Instruction::LdMemDir(build_value(src)?, dst)),
        _ => unreachable!("Unknown ld source rule: {:?}", src.as_rule()),
    }
}

// build and check operands for a store instruction
fn build_st(pair: Pair<Rule>) -> Result<Instruction, AssemblyError> {
    let mut inner = pair.into_inner();
    let src = build_gpr(inner.next().unwrap())?;
    let dst = inner.next().unwrap().into_inner().next().unwrap();

    match dst.as_rule() {
        Rule::mem_ind => {
            let mut parts = dst.into_inner();
            let base = build_gpr(parts.next().unwrap())?;
            match parts.next() {
                Some(offset) => Ok(Instruction::StRegIndOff(src, base, build_literal(offset)?)),
                None => Ok(Instruction::StRegInd(src, base)),
            }
        }
        Rule::value => Ok(Instruction::StMemDir(src, build_value(dst)?)),
        _ => unreachable!("Unknown st destination rule: {:?}", dst.as_rule()),
    }
}

// ------------- build instruction -------------

// Helper to build an Instruction from a pest Pair
fn build_instruction(pair: Pair<Rule>) -> Result<Instruction, AssemblyError> {
    match pair.as_rule() {
        Rule::halt => Ok(Instruction::Halt),
        Rule::int => Ok(Instruction::Int),
        Rule::iret => Ok(Instruction::Iret),
        Rule::ret => Ok(Instruction::Ret),
        Rule::call => Ok(Instruction::Call(build_value(
            pair.into_inner().next().unwrap(),
        )?)),
        Rule::jmp => Ok(Instruction::Jmp(build_value(
            pair.into_inner().next().unwrap(),
        )?)),
        Rule::beq => {
            let (gpr1, gpr2, target) = build_branch(pair)?;
            Ok(Instruction::Beq(gpr1, gpr2, target))
        }
        Rule::bne => {
            let (gpr1, gpr2, target) = build_branch(pair)?;
            Ok(Instruction::Bne(gpr1, gpr2, target))
        }
        Rule::bgt => {
            let (gpr1, gpr2, target) = build_branch(pair)?;
            Ok(Instruction::Bgt(gpr1, gpr2, target))
        }
        Rule::push => Ok(Instruction::Push(build_gpr(
            pair.into_inner().next().unwrap(),
        )?)),
        Rule::pop => Ok(Instruction::Pop(build_gpr(
            pair.into_inner().next().unwrap(),
        )?)),
        Rule::xchg => {
            let (gpr1, gpr2) = build_two_gprs(pair)?;
            Ok(Instruction::Xchg(gpr1, gpr2))
        }
        Rule::add => {
            let (src, dst) = build_two_gprs(pair)?;
            Ok(Instruction::Add(src, dst))
        }
        Rule::sub => {
            let (src, dst) = build_two_gprs(pair)?;
            Ok(Instruction::Sub(src, dst))
        }
        Rule::mul => {
            let (src, dst) = build_two_gprs(pair)?;
            Ok(Instruction::Mul(src, dst))
        }
        Rule::div => {
            let (src, dst) = build_two_gprs(pair)?;
            Ok(Instruction::Div(src, dst))
        }
        Rule::not => Ok(Instruction::Not(build_gpr(
            pair.into_inner().next().unwrap(),
        )?)),
        Rule::and => {
            let (src, dst) = build_two_gprs(pair)?;
            Ok(Instruction::And(src, dst))
        }
        Rule::or => {
            let (src, dst) = build_two_gprs(pair)?;
            Ok(Instruction::Or(src, dst))
        }
        Rule::xor => {
            let (src, dst) = build_two_gprs(pair)?;
            Ok(Instruction::Xor(src, dst))
        }
        Rule::shl => {
            let (src, dst) = build_two_gprs(pair)?;
            Ok(Instruction::Shl(src, dst))
        }
        Rule::shr => {
            let (src, dst) = build_two_gprs(pair)?;
            Ok(Instruction::Shr(src, dst))
        }
        Rule::ld => build_ld(pair),
        Rule::st => build_st(pair),
        Rule::csrrd => {
            let mut inner = pair.into_inner();
            let csr = build_csr(inner.next().unwrap())?;
            let gpr = build_gpr(inner.next().unwrap())?;
            Ok(Instruction::Csrrd(csr, gpr))
        }
        Rule::csrwr => {
            let mut inner = pair.into_inner();
            let gpr = build_gpr(inner.next().unwrap())?;
            let csr = build_csr(inner.next().unwrap())?;
            Ok(Instruction::Csrwr(gpr, csr))
        }
        _ => unreachable!("Unknown instruction rule: {:?}", pair.as_rule()),
    }
}

// ------------- build directive -------------

fn build_directive(pair: Pair<Rule>) -> Result<Directive, AssemblyError> {
    match pair.as_rule() {
        Rule::global_dir => Ok(Directive::Global(
            pair.into_inner().map(|p| p.as_str().to_string()).collect(),
        )),
        Rule::extern_dir => Ok(Directive::Extern(
            pair.into_inner().map(|p| p.as_str().to_string()).collect(),
        )),
        Rule::section_dir => Ok(Directive::Section(
            pair.into_inner().next().unwrap().as_str().to_string(),
        )),
        Rule::word_dir => {
            let words = pair
                .into_inner()
                .map(build_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Directive::Word(words))
        }
        Rule::skip_dir => {
            let literal_pair = pair.into_inner().next().unwrap();
            let line = line_of(&literal_pair);
            let count = build_literal(literal_pair)?;
            if count < 0 {
                return Err(AssemblyError::StructuralError {
                    line,
                    reason: format!("A .skip count cannot be negative: {count}"),
                });
            }
            Ok(Directive::Skip(count as u32))
        }
        Rule::end_dir => Ok(Directive::End),
        _ => unreachable!("Unknown directive rule: {:?}", pair.as_rule()),
    }
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_halt() {
        let lines = parse_source("halt\n").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].instruction, Some(Instruction::Halt));
        assert_eq!(lines[0].label, None);
    }

    #[test]
    fn test_parse_label_with_instruction() {
        let lines = parse_source("loop: add %r1, %r2\n").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].label.as_deref(), Some("loop"));
        assert_eq!(
            lines[0].instruction,
            Some(Instruction::Add(Register::R1, Register::R2))
        );
    }

    #[test]
    fn test_parse_register_aliases() {
        let lines = parse_source("push %sp\npop %pc\n").unwrap();
        assert_eq!(lines[0].instruction, Some(Instruction::Push(Register::R14)));
        assert_eq!(lines[1].instruction, Some(Instruction::Pop(Register::R15)));
    }

    #[test]
    fn test_parse_ld_addressing_modes() {
        let source = "\
ld $5, %r1
ld $sym, %r1
ld 0x100, %r2
ld %r3, %r4
ld [%r5], %r6
ld [%r7 + 16], %r8
";
        let lines = parse_source(source).unwrap();
        assert_eq!(
            lines[0].instruction,
            Some(Instruction::LdImm(Operand::Literal(5), Register::R1))
        );
        assert_eq!(
            lines[1].instruction,
            Some(Instruction::LdImm(
                Operand::Symbol("sym".to_string()),
                Register::R1
            ))
        );
        assert_eq!(
            lines[2].instruction,
            Some(Instruction::LdMemDir(Operand::Literal(0x100), Register::R2))
        );
        assert_eq!(
            lines[3].instruction,
            Some(Instruction::LdRegDir(Register::R3, Register::R4))
        );
        assert_eq!(
            lines[4].instruction,
            Some(Instruction::LdRegInd(Register::R5, Register::R6))
        );
        assert_eq!(
            lines[5].instruction,
            Some(Instruction::LdRegIndOff(Register::R7, 16, Register::R8))
        );
    }

    #[test]
    fn test_parse_st_addressing_modes() {
        let source = "\
st %r1, counter
st %r2, [%r3]
st %r4, [%sp + -4]
";
        let lines = parse_source(source).unwrap();
        assert_eq!(
            lines[0].instruction,
            Some(Instruction::StMemDir(
                Register::R1,
                Operand::Symbol("counter".to_string())
            ))
        );
        assert_eq!(
            lines[1].instruction,
            Some(Instruction::StRegInd(Register::R2, Register::R3))
        );
        assert_eq!(
            lines[2].instruction,
            Some(Instruction::StRegIndOff(Register::R4, Register::R14, -4))
        );
    }

    #[test]
    fn test_parse_branch() {
        let lines = parse_source("bgt %r1, %r2, loop\n").unwrap();
        assert_eq!(
            lines[0].instruction,
            Some(Instruction::Bgt(
                Register::R1,
                Register::R2,
                Operand::Symbol("loop".to_string())
            ))
        );
    }

    #[test]
    fn test_parse_csr_instructions() {
        let lines = parse_source("csrrd %handler, %r1\ncsrwr %r2, %status\n").unwrap();
        assert_eq!(
            lines[0].instruction,
            Some(Instruction::Csrrd(Csr::Handler, Register::R1))
        );
        assert_eq!(
            lines[1].instruction,
            Some(Instruction::Csrwr(Register::R2, Csr::Status))
        );
    }

    #[test]
    fn test_parse_directives() {
        let source = "\
.global a, b
.extern c
.section text
.word 4, label, 0x10
.skip 12
.end
";
        let lines = parse_source(source).unwrap();
        assert_eq!(
            lines[0].directive,
            Some(Directive::Global(vec!["a".to_string(), "b".to_string()]))
        );
        assert_eq!(
            lines[1].directive,
            Some(Directive::Extern(vec!["c".to_string()]))
        );
        assert_eq!(
            lines[2].directive,
            Some(Directive::Section("text".to_string()))
        );
        assert_eq!(
            lines[3].directive,
            Some(Directive::Word(vec![
                Operand::Literal(4),
                Operand::Symbol("label".to_string()),
                Operand::Literal(0x10),
            ]))
        );
        assert_eq!(lines[4].directive, Some(Directive::Skip(12)));
        assert_eq!(lines[5].directive, Some(Directive::End));
    }

    #[test]
    fn test_parse_comments_and_blank_lines() {
        let source = "# leading comment\n\nhalt # trailing comment\n\n";
        let lines = parse_source(source).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].instruction, Some(Instruction::Halt));
        assert_eq!(lines[0].line_number, 3);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_source("frobnicate %r1\n").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_register() {
        assert!(parse_source("push %r16\n").is_err());
    }
}
