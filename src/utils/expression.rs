use regex::Regex;
use std::sync::LazyLock;

static RE_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9+\-.\s]").expect("valid expression filter regex"));

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
}

fn tokenize(input: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // "1.2.3" e "." sozinho não são números
                if literal.matches('.').count() > 1 || literal == "." {
                    return None;
                }
                tokens.push(Token::Number(literal.parse().ok()?));
            }
        }
    }

    Some(tokens)
}

/// expr := term (('+' | '-') term)*, term := ('+' | '-')* number
fn evaluate(tokens: &[Token]) -> Option<f64> {
    let mut pos = 0;
    let mut total = parse_term(tokens, &mut pos)?;

    while pos < tokens.len() {
        let op = tokens[pos].clone();
        pos += 1;
        let value = parse_term(tokens, &mut pos)?;
        match op {
            Token::Plus => total += value,
            Token::Minus => total -= value,
            Token::Number(_) => return None,
        }
    }

    Some(total)
}

fn parse_term(tokens: &[Token], pos: &mut usize) -> Option<f64> {
    let mut sign = 1.0;
    loop {
        match tokens.get(*pos)? {
            Token::Plus => *pos += 1,
            Token::Minus => {
                sign = -sign;
                *pos += 1;
            }
            Token::Number(n) => {
                *pos += 1;
                return Some(sign * n);
            }
        }
    }
}

/// Avalia somas/subtrações digitadas no formato brasileiro
/// (`"R$ 345,23 + 234,21"` -> `579.44`). Entrada inválida resulta em `0.0`.
pub fn calculate_expression(expression: &str) -> f64 {
    let normalized = expression.replace(',', ".").replace("R$", "");
    let filtered = RE_DISALLOWED.replace_all(&normalized, "");

    let result = tokenize(&filtered)
        .filter(|tokens| !tokens.is_empty())
        .and_then(|tokens| evaluate(&tokens))
        .filter(|value| value.is_finite());

    match result {
        Some(value) => (value * 100.0).round() / 100.0,
        None => {
            tracing::warn!("⚠️ Could not evaluate expression '{}', using 0.0", expression);
            0.0
        }
    }
}
