//! PDF functions used as tint transforms of Separation and DeviceN spaces.
//!
//! Exponential (type 2), stitching (type 3) and PostScript calculator
//! (type 4) functions are evaluated. Sampled functions are not; a space whose
//! transform cannot be parsed is reported as unsupported by the caller.

use crate::content::{number, resolve};
use lopdf::{Dictionary, Document, Object};

/// Nesting limit for stitching functions and calculator procedures.
const MAX_NESTING: usize = 8;

/// Operand stack limit of the calculator, as in the PDF reference.
const MAX_STACK: usize = 100;

/// Operators understood by the calculator.
const OPERATORS: &[&str] = &[
    "abs", "add", "atan", "ceiling", "cos", "cvi", "cvr", "div", "exp", "floor", "idiv", "ln",
    "log", "mod", "mul", "neg", "round", "sin", "sqrt", "sub", "truncate", "and", "eq", "ge",
    "gt", "le", "lt", "ne", "not", "or", "xor", "copy", "dup", "exch", "index", "pop", "roll",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    /// Type 2: `c0 + x^exponent * (c1 - c0)`.
    Exponential {
        domain: Vec<f64>,
        c0: Vec<f64>,
        c1: Vec<f64>,
        exponent: f64,
        range: Option<Vec<f64>>,
    },
    /// Type 3: one-input function built from sub-functions over adjacent intervals.
    Stitching {
        domain: Vec<f64>,
        functions: Vec<Function>,
        bounds: Vec<f64>,
        encode: Vec<f64>,
        range: Option<Vec<f64>>,
    },
    /// Type 4: PostScript calculator program.
    Calculator {
        domain: Vec<f64>,
        range: Vec<f64>,
        program: Vec<Instruction>,
    },
}

/// One step of a calculator program.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Number(f64),
    Bool(bool),
    Operator(String),
    If(Vec<Instruction>),
    IfElse(Vec<Instruction>, Vec<Instruction>),
}

impl Function {
    /// Parses a function dictionary or stream. Returns `None` for unsupported
    /// function types and malformed definitions.
    pub fn from_object(doc: &Document, object: &Object) -> Option<Self> {
        Self::parse(doc, object, 0)
    }

    fn parse(doc: &Document, object: &Object, depth: usize) -> Option<Self> {
        let (dict, stream) = match resolve(doc, object) {
            Object::Dictionary(dict) => (dict, None),
            Object::Stream(stream) => (&stream.dict, Some(stream)),
            _ => return None,
        };
        let domain = numbers(doc, dict, b"Domain")?;
        if domain.len() < 2 || domain.len() % 2 != 0 {
            return None;
        }
        let range = numbers(doc, dict, b"Range");
        let function_type = match resolve(doc, dict.get(b"FunctionType").ok()?) {
            Object::Integer(t) => *t,
            _ => return None,
        };

        match function_type {
            2 => {
                let c0 = numbers(doc, dict, b"C0").unwrap_or_else(|| vec![0.0]);
                let c1 = numbers(doc, dict, b"C1").unwrap_or_else(|| vec![1.0]);
                if c0.len() != c1.len() {
                    return None;
                }
                let exponent = number(resolve(doc, dict.get(b"N").ok()?))?;
                Some(Function::Exponential {
                    domain,
                    c0,
                    c1,
                    exponent,
                    range,
                })
            }
            3 if depth < MAX_NESTING => {
                let functions = match resolve(doc, dict.get(b"Functions").ok()?) {
                    Object::Array(items) => items
                        .iter()
                        .map(|item| Self::parse(doc, item, depth + 1))
                        .collect::<Option<Vec<_>>>()?,
                    _ => return None,
                };
                let bounds = numbers(doc, dict, b"Bounds")?;
                let encode = numbers(doc, dict, b"Encode")?;
                if functions.is_empty()
                    || bounds.len() + 1 != functions.len()
                    || encode.len() != 2 * functions.len()
                {
                    return None;
                }
                Some(Function::Stitching {
                    domain,
                    functions,
                    bounds,
                    encode,
                    range,
                })
            }
            4 => {
                let stream = stream?;
                let code = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                let range = range.filter(|r| r.len() % 2 == 0)?;
                Some(Function::Calculator {
                    domain,
                    range,
                    program: parse_program(&code)?,
                })
            }
            _ => None,
        }
    }

    /// Evaluates the function. Inputs are clipped to the domain and outputs to
    /// the range. Returns `None` when the input is short or a calculator
    /// program fails.
    pub fn evaluate(&self, inputs: &[f64]) -> Option<Vec<f64>> {
        match self {
            Function::Exponential {
                domain,
                c0,
                c1,
                exponent,
                range,
            } => {
                let x = clip(*inputs.first()?, domain, 0);
                let scale = x.powf(*exponent);
                if !scale.is_finite() {
                    return None;
                }
                let out = c0.iter().zip(c1).map(|(a, b)| a + scale * (b - a)).collect();
                Some(clip_all(out, range.as_deref()))
            }
            Function::Stitching {
                domain,
                functions,
                bounds,
                encode,
                range,
            } => {
                let x = clip(*inputs.first()?, domain, 0);
                let index = bounds.iter().take_while(|bound| x >= **bound).count();
                let low = if index == 0 { domain[0] } else { bounds[index - 1] };
                let high = bounds.get(index).copied().unwrap_or(domain[1]);
                let (e0, e1) = (encode[2 * index], encode[2 * index + 1]);
                let t = if high > low {
                    e0 + (x - low) * (e1 - e0) / (high - low)
                } else {
                    e0
                };
                let out = functions[index].evaluate(&[t])?;
                Some(clip_all(out, range.as_deref()))
            }
            Function::Calculator {
                domain,
                range,
                program,
            } => {
                let mut stack: Vec<Value> = inputs
                    .iter()
                    .enumerate()
                    .map(|(i, v)| Value::Real(clip(*v, domain, i)))
                    .collect();
                execute(program, &mut stack)?;
                let outputs = range.len() / 2;
                if stack.len() < outputs {
                    return None;
                }
                let out = stack
                    .split_off(stack.len() - outputs)
                    .into_iter()
                    .map(|value| match value {
                        Value::Real(v) => Some(v),
                        Value::Bool(_) => None,
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(clip_all(out, Some(range)))
            }
        }
    }
}

fn numbers(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<Vec<f64>> {
    match resolve(doc, dict.get(key).ok()?) {
        Object::Array(items) => items.iter().map(|item| number(resolve(doc, item))).collect(),
        _ => None,
    }
}

/// Clips `value` to the `index`-th interval of a flattened `[min max ...]` list.
fn clip(value: f64, intervals: &[f64], index: usize) -> f64 {
    match intervals.get(2 * index..2 * index + 2) {
        Some([min, max]) if min <= max => value.clamp(*min, *max),
        _ => value,
    }
}

fn clip_all(values: Vec<f64>, range: Option<&[f64]>) -> Vec<f64> {
    match range {
        Some(range) => values
            .into_iter()
            .enumerate()
            .map(|(i, v)| clip(v, range, i))
            .collect(),
        None => values,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Real(f64),
    Bool(bool),
}

fn parse_program(code: &[u8]) -> Option<Vec<Instruction>> {
    let text = String::from_utf8_lossy(code);
    let mut tokens = Vec::new();
    for line in text.lines() {
        let line = line.split('%').next().unwrap_or_default();
        let spaced = line.replace('{', " { ").replace('}', " } ");
        tokens.extend(spaced.split_whitespace().map(str::to_string));
    }

    let mut tokens = tokens.into_iter();
    if tokens.next()? != "{" {
        return None;
    }
    let program = parse_block(&mut tokens, 0)?;
    tokens.next().is_none().then_some(program)
}

/// Parses instructions up to the closing brace of the current procedure.
fn parse_block(tokens: &mut impl Iterator<Item = String>, depth: usize) -> Option<Vec<Instruction>> {
    if depth > MAX_NESTING {
        return None;
    }
    let mut program = Vec::new();
    // Procedures waiting for their `if`/`ifelse`.
    let mut procedures: Vec<Vec<Instruction>> = Vec::new();

    loop {
        let token = tokens.next()?;
        match token.as_str() {
            "}" => return procedures.is_empty().then_some(program),
            "{" => procedures.push(parse_block(tokens, depth + 1)?),
            "if" => {
                let body = procedures.pop()?;
                if !procedures.is_empty() {
                    return None;
                }
                program.push(Instruction::If(body));
            }
            "ifelse" => {
                let otherwise = procedures.pop()?;
                let then = procedures.pop()?;
                if !procedures.is_empty() {
                    return None;
                }
                program.push(Instruction::IfElse(then, otherwise));
            }
            _ if !procedures.is_empty() => return None,
            "true" => program.push(Instruction::Bool(true)),
            "false" => program.push(Instruction::Bool(false)),
            word => match word.parse::<f64>() {
                Ok(v) if v.is_finite() => program.push(Instruction::Number(v)),
                _ if OPERATORS.contains(&word) => {
                    program.push(Instruction::Operator(word.to_string()))
                }
                _ => return None,
            },
        }
    }
}

fn execute(program: &[Instruction], stack: &mut Vec<Value>) -> Option<()> {
    for instruction in program {
        if stack.len() > MAX_STACK {
            return None;
        }
        match instruction {
            Instruction::Number(v) => stack.push(Value::Real(*v)),
            Instruction::Bool(b) => stack.push(Value::Bool(*b)),
            Instruction::If(body) => {
                if pop_bool(stack)? {
                    execute(body, stack)?;
                }
            }
            Instruction::IfElse(then, otherwise) => {
                if pop_bool(stack)? {
                    execute(then, stack)?;
                } else {
                    execute(otherwise, stack)?;
                }
            }
            Instruction::Operator(name) => apply(name, stack)?,
        }
    }
    Some(())
}

fn pop_real(stack: &mut Vec<Value>) -> Option<f64> {
    match stack.pop()? {
        Value::Real(v) => Some(v),
        Value::Bool(_) => None,
    }
}

fn pop_bool(stack: &mut Vec<Value>) -> Option<bool> {
    match stack.pop()? {
        Value::Bool(b) => Some(b),
        Value::Real(_) => None,
    }
}

fn pop_integer(stack: &mut Vec<Value>) -> Option<i64> {
    let v = pop_real(stack)?;
    (v.fract() == 0.0).then_some(v as i64)
}

fn pop_count(stack: &mut Vec<Value>) -> Option<usize> {
    usize::try_from(pop_integer(stack)?).ok()
}

fn apply(name: &str, stack: &mut Vec<Value>) -> Option<()> {
    let result = match name {
        "dup" => *stack.last()?,
        "pop" => {
            stack.pop()?;
            return Some(());
        }
        "exch" => {
            let len = stack.len();
            if len < 2 {
                return None;
            }
            stack.swap(len - 1, len - 2);
            return Some(());
        }
        "copy" => {
            let n = pop_count(stack)?;
            let len = stack.len();
            if n > len {
                return None;
            }
            stack.extend_from_within(len - n..);
            return Some(());
        }
        "index" => {
            let n = pop_count(stack)?;
            let len = stack.len();
            if n >= len {
                return None;
            }
            stack[len - 1 - n]
        }
        "roll" => {
            let shift = pop_integer(stack)?;
            let n = pop_count(stack)?;
            let len = stack.len();
            if n > len {
                return None;
            }
            if n > 0 {
                let amount = shift.rem_euclid(n as i64) as usize;
                stack[len - n..].rotate_right(amount);
            }
            return Some(());
        }
        "not" => match stack.pop()? {
            Value::Bool(b) => Value::Bool(!b),
            Value::Real(v) => Value::Real(!(v as i64) as f64),
        },
        "and" | "or" | "xor" => {
            let b = stack.pop()?;
            let a = stack.pop()?;
            match (a, b) {
                (Value::Bool(a), Value::Bool(b)) => Value::Bool(match name {
                    "and" => a && b,
                    "or" => a || b,
                    _ => a ^ b,
                }),
                (Value::Real(a), Value::Real(b)) => {
                    let (a, b) = (a as i64, b as i64);
                    let bits = match name {
                        "and" => a & b,
                        "or" => a | b,
                        _ => a ^ b,
                    };
                    Value::Real(bits as f64)
                }
                _ => return None,
            }
        }
        "eq" | "ne" => {
            let b = stack.pop()?;
            let a = stack.pop()?;
            Value::Bool((a == b) == (name == "eq"))
        }
        "gt" | "ge" | "lt" | "le" => {
            let b = pop_real(stack)?;
            let a = pop_real(stack)?;
            Value::Bool(match name {
                "gt" => a > b,
                "ge" => a >= b,
                "lt" => a < b,
                _ => a <= b,
            })
        }
        "add" | "sub" | "mul" | "div" | "idiv" | "mod" | "exp" | "atan" => {
            let b = pop_real(stack)?;
            let a = pop_real(stack)?;
            let v = match name {
                "add" => a + b,
                "sub" => a - b,
                "mul" => a * b,
                "div" if b != 0.0 => a / b,
                "idiv" if b.trunc() != 0.0 => (a.trunc() / b.trunc()).trunc(),
                "mod" if b.trunc() != 0.0 => a.trunc() % b.trunc(),
                "exp" => a.powf(b),
                "atan" => a.atan2(b).to_degrees().rem_euclid(360.0),
                _ => return None,
            };
            Value::Real(v)
        }
        _ => {
            let a = pop_real(stack)?;
            let v = match name {
                "abs" => a.abs(),
                "neg" => -a,
                "ceiling" => a.ceil(),
                "floor" => a.floor(),
                "round" => (a + 0.5).floor(),
                "truncate" | "cvi" => a.trunc(),
                "cvr" => a,
                "sqrt" if a >= 0.0 => a.sqrt(),
                "sin" => a.to_radians().sin(),
                "cos" => a.to_radians().cos(),
                "ln" if a > 0.0 => a.ln(),
                "log" if a > 0.0 => a.log10(),
                _ => return None,
            };
            Value::Real(v)
        }
    };
    if let Value::Real(v) = result {
        if !v.is_finite() {
            return None;
        }
    }
    stack.push(result);
    Some(())
}
