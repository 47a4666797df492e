//! # chat-render
//!
//! チャットメッセージの描画レイヤー。
//!
//! - [`format_message`]: 軽量 Markdown → HTML マークアップ変換（決定的・状態なし）
//! - [`IncrementalRenderer`]: 受信した delta を 1 つずつ変換し、メッセージノードに追記する
//! - [`MessageView`]: 描画先ノードの抽象化（DOM 実装は `chat-wasm`、テスト用は [`BufferView`]）
//!
//! ## 対応する記法
//!
//! | 入力               | 出力                         |
//! |--------------------|------------------------------|
//! | `**text**`         | `<strong>text</strong>`      |
//! | `*text*`           | `<em>text</em>`              |
//! | `` `text` ``       | `<code>text</code>`          |
//! | 改行               | `<br>`                       |
//! | 行頭の `# `        | `<h3>…</h3>`                 |
//! | 行頭の `- `        | `<li>…</li>`（連続する項目は `<ul>` で囲む） |
//!
//! ## ストリーミング時の制約
//!
//! 変換は delta ごとに独立して行う。`**` のような記号が 2 つの delta に
//! またがった場合はそのまま文字として表示される。リストも delta ごとに
//! `<ul>` を閉じて開き直す。

#![no_std]
extern crate alloc;

pub mod markup;
pub mod renderer;

pub use markup::format_message;
pub use renderer::{BufferView, IncrementalRenderer, MessageView, RenderedMessage};
