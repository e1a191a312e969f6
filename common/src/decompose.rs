/// Máximo de sub-objetivos que devuelve el descomponedor.
pub const MAX_SUBGOALS: usize = 8;

/// Tamaño mínimo de cada trozo cuando hay que cortar por palabras.
const MIN_CHUNK_WORDS: usize = 5;

/// Parte un objetivo en texto libre en 1..=8 sub-objetivos.
///
/// Cadena de respaldo, cada paso sólo si el anterior dejó <= 1 fragmento:
/// 1. oraciones (`.`, `?`, `!`, salto de línea)
/// 2. comas
/// 3. trozos contiguos de `max(5, palabras / 3)` palabras
///
/// Determinística, nunca vacía y nunca entra en pánico. Un objetivo vacío
/// devuelve un único sub-objetivo vacío; rechazarlo es cosa de quien llama.
pub fn decompose(goal: &str) -> Vec<String> {
    let trimmed = goal.trim();

    let mut parts = split_fragments(trimmed, |c| matches!(c, '.' | '?' | '!' | '\n'));

    if parts.len() <= 1 {
        parts = split_fragments(trimmed, |c| c == ',');
    }

    if parts.len() <= 1 {
        parts = chunk_words(trimmed);
    }

    if parts.is_empty() {
        parts.push(trimmed.to_string());
    }

    parts.truncate(MAX_SUBGOALS);
    parts
}

fn split_fragments<F>(text: &str, is_separator: F) -> Vec<String>
where
    F: Fn(char) -> bool,
{
    text.split(is_separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn chunk_words(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let chunk_size = MIN_CHUNK_WORDS.max(words.len() / 3);

    words.chunks(chunk_size).map(|chunk| chunk.join(" ")).collect()
}
