use crate::utils::error::{ErrorHandler, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
enum EnvLine {
    Entry {
        key: String,
        value: String,
        quote: Option<char>,
        raw: String,
    },
    Verbatim(String),
}

/// Arquivo `.env` editável que mantém comentários, linhas vazias e ordem.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<EnvLine>,
}

impl EnvFile {
    /// Arquivo ausente resulta em um `.env` vazio.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|e| ErrorHandler::file_error(e, path, "read_env"))?
        } else {
            String::new()
        };
        Ok(Self::parse(path, &content))
    }

    pub fn parse(path: impl AsRef<Path>, content: &str) -> Self {
        let lines = content
            .lines()
            .map(|line| {
                let stripped = line.trim();
                if stripped.is_empty() || stripped.starts_with('#') {
                    return EnvLine::Verbatim(line.to_string());
                }
                match stripped.split_once('=') {
                    Some((key, value)) => {
                        let (value, quote) = unquote(value.trim());
                        EnvLine::Entry {
                            key: key.trim().to_string(),
                            value,
                            quote,
                            raw: line.to_string(),
                        }
                    }
                    None => EnvLine::Verbatim(line.to_string()),
                }
            })
            .collect();

        Self {
            path: path.as_ref().to_path_buf(),
            lines,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Valor sem aspas. Com chave repetida vale a primeira ocorrência, como no
    /// `dotenv::from_path`, que não sobrescreve variáveis já definidas.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            EnvLine::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Atualiza a variável no lugar ou acrescenta no final.
    pub fn set(&mut self, key: &str, value: &str) {
        let mut found = false;
        for line in &mut self.lines {
            if let EnvLine::Entry {
                key: k,
                value: v,
                quote,
                raw,
            } = line
            {
                if k == key {
                    if v != value {
                        *v = value.to_string();
                        *quote = quote_for(value, *quote);
                        *raw = render_entry(key, value, *quote);
                    }
                    found = true;
                }
            }
        }

        if !found {
            let quote = quote_for(value, None);
            self.lines.push(EnvLine::Entry {
                key: key.to_string(),
                value: value.to_string(),
                quote,
                raw: render_entry(key, value, quote),
            });
        }
    }

    pub fn entries(&self) -> BTreeMap<String, String> {
        let mut entries = BTreeMap::new();
        for line in &self.lines {
            if let EnvLine::Entry { key, value, .. } = line {
                entries.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        entries
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                EnvLine::Entry { raw, .. } | EnvLine::Verbatim(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, self.render())
            .map_err(|e| ErrorHandler::file_error(e, &self.path, "write_env"))?;

        crate::utils::logger::log_operation(
            "env_write",
            "SUCCESS",
            &crate::details!(
                "file_path" => self.path.display().to_string(),
                "variables" => self.entries().len()
            ),
        );
        Ok(())
    }
}

/// Remove as aspas que envolvem o valor inteiro. Aspas simples são literais;
/// entre aspas duplas vale o escape com `\` do `dotenv`.
fn unquote(value: &str) -> (String, Option<char>) {
    let wrapped = |q: char| value.len() >= 2 && value.starts_with(q) && value.ends_with(q);
    if wrapped('\'') {
        return (value[1..value.len() - 1].to_string(), Some('\''));
    }
    if wrapped('"') {
        let mut out = String::new();
        let mut chars = value[1..value.len() - 1].chars();
        while let Some(c) = chars.next() {
            match (c, chars.clone().next()) {
                ('\\', Some('n')) => {
                    out.push('\n');
                    chars.next();
                }
                ('\\', Some(next @ ('\\' | '"' | '\'' | '$' | ' '))) => {
                    out.push(next);
                    chars.next();
                }
                _ => out.push(c),
            }
        }
        return (out, Some('"'));
    }
    (value.to_string(), None)
}

/// Aspas para valores com espaço ou `#`; simples quando possível, para não
/// escapar as barras de caminhos do Windows.
fn quote_for(value: &str, current: Option<char>) -> Option<char> {
    let needs_quotes = value.chars().any(|c| c.is_whitespace() || c == '#');
    match current {
        Some('\'') if value.contains('\'') => Some('"'),
        Some(q) => Some(q),
        None if needs_quotes && value.contains('\'') => Some('"'),
        None if needs_quotes => Some('\''),
        None => None,
    }
}

fn render_entry(key: &str, value: &str, quote: Option<char>) -> String {
    match quote {
        Some('"') => format!("{key}=\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")),
        Some(q) => format!("{key}={q}{value}{q}"),
        None => format!("{key}={value}"),
    }
}
