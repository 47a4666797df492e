//! 軽量 Markdown → HTML マークアップ変換
//!
//! 行単位でブロック（見出し・リスト項目・テキスト）を判定し、
//! 各行の本文にインライン記法（太字 → 斜体 → コード）を順に適用する。
//! インライン記法は改行をまたがない。

use alloc::string::String;

/// 改行に対応するマークアップ
const LINE_BREAK: &str = "<br>";

/// 1 行分のブロック種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block<'a> {
    /// 行頭 `# ` → `<h3>`
    Heading(&'a str),
    /// 行頭 `- ` → `<li>`
    ListItem(&'a str),
    /// それ以外
    Text(&'a str),
}

impl<'a> Block<'a> {
    fn classify(line: &'a str) -> Self {
        if let Some(body) = block_body(line, '#') {
            Block::Heading(body)
        } else if let Some(body) = block_body(line, '-') {
            Block::ListItem(body)
        } else {
            Block::Text(line)
        }
    }
}

/// `marker` の直後に空白が 1 文字以上続く行なら、空白を除いた本文を返す
fn block_body(line: &str, marker: char) -> Option<&str> {
    let rest = line.strip_prefix(marker)?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// テキストを HTML マークアップに変換する
///
/// 本文中の `&` `<` `>` はエスケープされるので、生成したタグ以外の要素が
/// 混入することはない。
///
/// # 例
/// ```
/// use chat_render::format_message;
///
/// assert_eq!(
///     format_message("**bold** and *italic* and `code`"),
///     "<strong>bold</strong> and <em>italic</em> and <code>code</code>"
/// );
/// assert_eq!(format_message("- a\n- b"), "<ul><li>a</li><li>b</li></ul>");
/// ```
pub fn format_message(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut in_list = false;

    for (index, line) in text.split('\n').enumerate() {
        let block = Block::classify(line);
        let is_item = matches!(block, Block::ListItem(_));

        if in_list && !is_item {
            out.push_str("</ul>");
            in_list = false;
        }
        // 同じリスト内の項目同士の改行は <br> にしない
        if index > 0 && !(in_list && is_item) {
            out.push_str(LINE_BREAK);
        }

        match block {
            Block::Heading(body) => {
                out.push_str("<h3>");
                push_inline(&mut out, body);
                out.push_str("</h3>");
            }
            Block::ListItem(body) => {
                if !in_list {
                    out.push_str("<ul>");
                    in_list = true;
                }
                out.push_str("<li>");
                push_inline(&mut out, body);
                out.push_str("</li>");
            }
            Block::Text(body) => push_inline(&mut out, body),
        }
    }

    if in_list {
        out.push_str("</ul>");
    }
    out
}

/// 1 行分の本文にインライン記法を適用して追記する
fn push_inline(out: &mut String, text: &str) {
    let escaped = escape_html(text);
    let bold = replace_pairs(&escaped, "**", "<strong>", "</strong>");
    let italic = replace_pairs(&bold, "*", "<em>", "</em>");
    let code = replace_pairs(&italic, "`", "<code>", "</code>");
    out.push_str(&code);
}

/// `marker … marker` の組を左から最短一致で `open … close` に置き換える
///
/// 閉じ記号が見つからない開き記号以降はそのまま残す。
fn replace_pairs(text: &str, marker: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(marker) {
        let after = &rest[start + marker.len()..];
        let Some(end) = after.find(marker) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(open);
        out.push_str(&after[..end]);
        out.push_str(close);
        rest = &after[end + marker.len()..];
    }

    out.push_str(rest);
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
