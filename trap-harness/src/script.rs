//! Line-oriented trap scripts for replaying trap sequences from the command
//! line.
//!
//! ```text
//! # comment
//! install m 0x80000100 vectored
//! delegate 0x100 0
//! mode s
//! pc 0x80000200
//! reg a1 0x40000000
//! trap 13 0xdead        # cause [tval] [instruction]
//! ecall 4 0 0           # op [vpn] [page type]
//! log 0x111
//! terminate
//! ```

use crate::cpu::{Mode, Register, TrapEvent};
use crate::error::HarnessError;
use crate::harness::{Harness, TrapOutcome};
use crate::trap::vector::VectorMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Install {
        level: Mode,
        base: u64,
        vector: VectorMode,
    },
    Delegate {
        medeleg: u64,
        mideleg: u64,
    },
    Mode(Mode),
    Pc(u64),
    Reg(Register, u64),
    Trap {
        cause: u64,
        tval: Option<u64>,
        instruction: Option<u32>,
    },
    Ecall {
        op: u64,
        target_vpn: u64,
        page_type: u64,
    },
    Log(u64),
    Terminate,
}

/// Outcome of one trap-taking script line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub line: usize,
    pub outcome: TrapOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    commands: Vec<(usize, Command)>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self, HarnessError> {
        let mut commands = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }
            let words: Vec<&str> = content.split_whitespace().collect();
            let command = parse_command(&words).map_err(|message| HarnessError::Script { line, message })?;
            commands.push((line, command));
        }
        Ok(Self { commands })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Execute against `harness`, stopping at the first halt.
    pub fn run(&self, harness: &mut Harness) -> Result<Vec<StepReport>, HarnessError> {
        let mut reports = Vec::new();
        for (line, command) in &self.commands {
            if harness.is_halted() {
                log::warn!("Harness halted; skipping script from line {}", line);
                break;
            }
            if let Some(outcome) = execute(command, harness)? {
                reports.push(StepReport {
                    line: *line,
                    outcome,
                });
            }
        }
        Ok(reports)
    }
}

fn execute(command: &Command, harness: &mut Harness) -> Result<Option<TrapOutcome>, HarnessError> {
    let outcome = match *command {
        Command::Install {
            level,
            base,
            vector,
        } => {
            harness.install_handler(level, base, vector)?;
            None
        }
        Command::Delegate { medeleg, mideleg } => {
            harness.set_delegation(medeleg, mideleg);
            None
        }
        Command::Mode(mode) => {
            harness.cpu.mode = mode;
            None
        }
        Command::Pc(pc) => {
            harness.cpu.pc = pc;
            None
        }
        Command::Reg(reg, value) => {
            harness.cpu.write_reg(reg, value);
            None
        }
        Command::Log(word) => {
            harness.log.append(word)?;
            None
        }
        Command::Trap {
            cause,
            tval,
            instruction,
        } => {
            let mut event = TrapEvent {
                cause,
                faulting_address: None,
                origin: harness.cpu.mode,
                pc: harness.cpu.pc,
                instruction: None,
            };
            if let Some(addr) = tval {
                event = event.with_address(addr);
            }
            if let Some(insn) = instruction {
                event = event.with_instruction(insn);
            }
            Some(harness.raise(event)?)
        }
        Command::Ecall {
            op,
            target_vpn,
            page_type,
        } => Some(harness.ecall(op, target_vpn, page_type)?),
        Command::Terminate => Some(harness.terminate()?),
    };
    Ok(outcome)
}

fn parse_command(words: &[&str]) -> Result<Command, String> {
    let (name, args) = match words.split_first() {
        Some((name, args)) => (*name, args),
        None => return Err("empty command".to_string()),
    };

    let arity = |min: usize, max: usize| -> Result<(), String> {
        if args.len() < min || args.len() > max {
            Err(format!("'{}' takes {}..={} arguments, got {}", name, min, max, args.len()))
        } else {
            Ok(())
        }
    };

    match name {
        "install" => {
            arity(2, 3)?;
            let level = parse_mode(args[0])?;
            let base = parse_num(args[1])?;
            let vector = match args.get(2).copied() {
                None | Some("direct") => VectorMode::Direct,
                Some("vectored") => VectorMode::Vectored,
                Some(other) => return Err(format!("unknown vector mode '{}'", other)),
            };
            Ok(Command::Install {
                level,
                base,
                vector,
            })
        }
        "delegate" => {
            arity(2, 2)?;
            Ok(Command::Delegate {
                medeleg: parse_num(args[0])?,
                mideleg: parse_num(args[1])?,
            })
        }
        "mode" => {
            arity(1, 1)?;
            Ok(Command::Mode(parse_mode(args[0])?))
        }
        "pc" => {
            arity(1, 1)?;
            Ok(Command::Pc(parse_num(args[0])?))
        }
        "reg" => {
            arity(2, 2)?;
            Ok(Command::Reg(parse_reg(args[0])?, parse_num(args[1])?))
        }
        "log" => {
            arity(1, 1)?;
            Ok(Command::Log(parse_num(args[0])?))
        }
        "trap" => {
            arity(1, 3)?;
            let instruction = match args.get(2) {
                Some(s) => Some(
                    u32::try_from(parse_num(s)?)
                        .map_err(|_| format!("instruction '{}' wider than 32 bits", s))?,
                ),
                None => None,
            };
            Ok(Command::Trap {
                cause: parse_num(args[0])?,
                tval: args.get(1).map(|s| parse_num(s)).transpose()?,
                instruction,
            })
        }
        "ecall" => {
            arity(1, 3)?;
            let opt = |i: usize| args.get(i).map_or(Ok(0), |s| parse_num(s));
            Ok(Command::Ecall {
                op: parse_num(args[0])?,
                target_vpn: opt(1)?,
                page_type: opt(2)?,
            })
        }
        "terminate" => {
            arity(0, 0)?;
            Ok(Command::Terminate)
        }
        _ => Err(format!("unknown command '{}'", name)),
    }
}

fn parse_num(arg: &str) -> Result<u64, String> {
    let clean = arg.replace('_', "");
    let parsed = if let Some(hex) = clean.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        clean.parse::<u64>().ok()
    };
    parsed.ok_or_else(|| format!("invalid number '{}'", arg))
}

fn parse_mode(arg: &str) -> Result<Mode, String> {
    Mode::from_letter(arg).ok_or_else(|| format!("invalid mode '{}' (expected m, s or u)", arg))
}

fn parse_reg(arg: &str) -> Result<Register, String> {
    let index = match arg {
        "ra" => 1,
        "t0" => 5,
        "a0" => 10,
        "a1" => 11,
        "a2" => 12,
        _ => arg
            .strip_prefix('x')
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|&n| n < 32)
            .ok_or_else(|| format!("invalid register '{}'", arg))?,
    };
    Ok(Register::from_u32(index))
}
