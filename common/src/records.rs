//! Formato de los archivos intermedios y de salida: una línea
//! `clave<TAB>valor` por registro.
//!
//! Las claves pueden traer tabs o saltos de línea, así que ambos campos se
//! escapan al escribir (`\\`, `\t`, `\n`, `\r`) y se desescapan al leer.
//! Una línea que no se puede interpretar es un error `InvalidData`.

use std::{
    borrow::Cow,
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
};

pub const FIELD_DELIMITER: char = '\t';

fn needs_escape(c: char) -> bool {
    matches!(c, '\\' | '\t' | '\n' | '\r')
}

pub fn escape_field(raw: &str) -> Cow<'_, str> {
    if !raw.chars().any(needs_escape) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

pub fn unescape_field(escaped: &str) -> io::Result<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                return Err(invalid(format!("secuencia de escape desconocida \\{other}")));
            }
            None => return Err(invalid("escape incompleto al final del campo".to_string())),
        }
    }

    Ok(out)
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

pub fn write_record<W: Write>(w: &mut W, key: &str, value: u64) -> io::Result<()> {
    writeln!(w, "{}{}{}", escape_field(key), FIELD_DELIMITER, value)
}

pub fn parse_record(line: &str) -> io::Result<(String, u64)> {
    let (raw_key, raw_value) = line
        .split_once(FIELD_DELIMITER)
        .ok_or_else(|| invalid(format!("línea sin delimitador: {line:?}")))?;

    let value = raw_value
        .trim()
        .parse::<u64>()
        .map_err(|e| invalid(format!("valor inválido {raw_value:?}: {e}")))?;

    Ok((unescape_field(raw_key)?, value))
}

/// Escribe todos los registros en `path`, creando la carpeta si hace falta.
/// Con un iterador vacío deja un archivo vacío.
pub fn write_records_file<'a, I>(path: &Path, entries: I) -> io::Result<()>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for (key, value) in entries {
        write_record(&mut writer, key, value)?;
    }
    writer.flush()
}

/// Lee un archivo completo; cualquier línea mal formada aborta la lectura.
pub fn read_records_file(path: &Path) -> io::Result<Vec<(String, u64)>> {
    let file = File::open(path)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let rec = parse_record(&line).map_err(|e| {
            io::Error::new(e.kind(), format!("{}: {e}", path.display()))
        })?;
        out.push(rec);
    }

    Ok(out)
}
