use crate::bytecode::{Op, Program};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

/// Render a program as a listing: one section for main and one per
/// method, with jump targets marked.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    let targets = collect_jump_targets(program.ops());

    let mut sections: Vec<(usize, &str)> = vec![(0, "main")];
    sections.extend(program.methods().map(|(name, offset)| (offset, name)));
    sections.sort_by_key(|(offset, _)| *offset);

    let entries: HashMap<usize, &str> = program
        .methods()
        .map(|(name, offset)| (offset, name))
        .collect();

    for (i, (start, name)) in sections.iter().enumerate() {
        let end = sections
            .get(i + 1)
            .map_or(program.len(), |(next, _)| *next)
            .max(*start);

        let _ = writeln!(out, "════════════════════════════════════════");
        let _ = writeln!(out, " {}", name);
        let _ = writeln!(out, " {} instructions", end - start);
        let _ = writeln!(out, "════════════════════════════════════════");

        for ip in *start..end {
            let op = &program.ops()[ip];
            let is_target = targets.contains(&ip);
            if is_target && ip != *start {
                let _ = writeln!(out, "      ┌──────────────────────────────────");
            }
            let marker = if is_target { "► " } else { "  " };
            let _ = writeln!(
                out,
                "{:04} {}{}",
                ip,
                marker,
                format_op(op, ip, program, &entries)
            );
        }
        out.push('\n');
    }

    out
}

fn collect_jump_targets(ops: &[Op]) -> BTreeSet<usize> {
    ops.iter().filter_map(Op::target).collect()
}

fn format_op(op: &Op, ip: usize, program: &Program, entries: &HashMap<usize, &str>) -> String {
    let name = op.mnemonic();
    match op {
        Op::Read(t) | Op::Set(t) => format!("{:<12}{}", name, t),
        Op::SetDefault(field) | Op::SetNull(field) | Op::Enter(field) => {
            format!("{:<12}field {}", name, field)
        }
        Op::SetUnionBranch(branch) => format!("{:<12}branch {}", name, branch),
        Op::SetEnumSymbol(symbol) => format!("{:<12}symbol {}", name, symbol),
        Op::EvalEqual(v) | Op::EvalGreater(v) | Op::AddLong(v) | Op::MultLong(v) => {
            format!("{:<12}{}", name, v)
        }
        Op::Jump(target) | Op::CondJump(target) => {
            let direction = if *target <= ip { "↑" } else { "↓" };
            format!("{:<12}{} (→ {:04})", name, direction, target)
        }
        Op::Call(target) => match entries.get(target) {
            Some(method) => format!("{:<12}{} (→ {:04})", name, method, target),
            None => format!("{:<12}(→ {:04})", name, target),
        },
        Op::Halt(error_id) => match program.error_message(*error_id) {
            Some(message) => format!("{:<12}#{} ; {}", name, error_id, message),
            None => format!("{:<12}#{}", name, error_id),
        },
        Op::Exit
        | Op::AppendArray
        | Op::AppendMap
        | Op::PushLoop
        | Op::PopLoop
        | Op::HintSize
        | Op::Return => name.to_string(),
    }
}
