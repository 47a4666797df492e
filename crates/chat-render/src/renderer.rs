//! インクリメンタルレンダラ

use alloc::string::String;

use crate::markup::format_message;

/// メッセージ描画先ノードの抽象化
///
/// ブラウザでは `.message-content` 要素とそれを含むスクロールコンテナ、
/// ネイティブテストでは [`BufferView`] が実装する。
pub trait MessageView {
    /// 既存の内容の末尾にマークアップを追加する（既存部分は再解析しない）
    fn append_markup(&mut self, markup: &str);

    /// 内容全体をマークアップで置き換える
    fn replace_markup(&mut self, markup: &str);

    /// 最新の内容が見えるよう、スクロール位置を最下部に移動する
    fn scroll_to_end(&mut self);
}

/// 1 回の応答で描画した累積マークアップ
///
/// ストリーミング中は追記のみで単調に増加する。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMessage {
    markup: String,
    /// 追記した delta の数
    deltas: usize,
}

impl RenderedMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.markup
    }

    pub fn len(&self) -> usize {
        self.markup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markup.is_empty()
    }

    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    fn push(&mut self, markup: &str) {
        self.markup.push_str(markup);
        self.deltas += 1;
    }

    fn replace(&mut self, markup: String) {
        self.markup = markup;
        self.deltas = 0;
    }
}

/// delta を 1 つずつ変換してメッセージノードに追記するレンダラ
///
/// 変換は delta ごとに独立して行う（[`format_message`] を参照）。
pub struct IncrementalRenderer<V: MessageView> {
    view: V,
    message: RenderedMessage,
}

impl<V: MessageView> IncrementalRenderer<V> {
    /// 描画先ノードを指定してレンダラを生成する
    pub fn new(view: V) -> Self {
        IncrementalRenderer {
            view,
            message: RenderedMessage::new(),
        }
    }

    /// delta を変換して追記し、ビューを最下部までスクロールする
    ///
    /// 空の delta は何もしない。
    pub fn append(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        let markup = format_message(delta);
        self.message.push(&markup);
        self.view.append_markup(&markup);
        self.view.scroll_to_end();
    }

    /// メッセージ全体を一度に変換し、ノードの内容を置き換える
    ///
    /// 非ストリーミング応答（`{reply}`）用。
    ///
    /// # 戻り値
    /// 置き換え後のマークアップ
    pub fn render_complete(&mut self, content: &str) -> &str {
        let markup = format_message(content);
        self.view.replace_markup(&markup);
        self.message.replace(markup);
        self.view.scroll_to_end();
        self.message.as_str()
    }

    /// これまでに描画したマークアップ
    pub fn message(&self) -> &RenderedMessage {
        &self.message
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    /// ビューと累積マークアップに分解する
    pub fn into_parts(self) -> (V, RenderedMessage) {
        (self.view, self.message)
    }
}

/// メモリ上のメッセージノード
///
/// DOM の無い環境（ネイティブテスト・ヘッドレス利用）向け。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferView {
    markup: String,
    /// `scroll_to_end` が呼ばれた回数
    scrolls: usize,
    /// `replace_markup` が呼ばれた回数
    replacements: usize,
}

impl BufferView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn scroll_count(&self) -> usize {
        self.scrolls
    }

    pub fn replacement_count(&self) -> usize {
        self.replacements
    }
}

impl MessageView for BufferView {
    fn append_markup(&mut self, markup: &str) {
        self.markup.push_str(markup);
    }

    fn replace_markup(&mut self, markup: &str) {
        self.markup.clear();
        self.markup.push_str(markup);
        self.replacements += 1;
    }

    fn scroll_to_end(&mut self) {
        self.scrolls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_is_monotonic() {
        let mut renderer = IncrementalRenderer::new(BufferView::new());
        renderer.append("Hello ");
        renderer.append("**world**");
        renderer.append("\n- item");

        let expected = "Hello <strong>world</strong><br><ul><li>item</li></ul>";
        assert_eq!(renderer.message().as_str(), expected);
        assert_eq!(renderer.view().markup(), expected);
        assert_eq!(renderer.message().delta_count(), 3);
        assert_eq!(renderer.view().scroll_count(), 3);
    }

    #[test]
    fn test_empty_delta_is_ignored() {
        let mut renderer = IncrementalRenderer::new(BufferView::new());
        renderer.append("");
        assert!(renderer.message().is_empty());
        assert_eq!(renderer.view().scroll_count(), 0);
    }

    #[test]
    fn test_markers_split_across_deltas_are_not_joined() {
        let mut renderer = IncrementalRenderer::new(BufferView::new());
        renderer.append("**bo");
        renderer.append("ld**");
        assert!(!renderer.message().as_str().contains("<strong>"));
    }

    #[test]
    fn test_list_across_deltas_reopens_container() {
        let mut renderer = IncrementalRenderer::new(BufferView::new());
        renderer.append("- a\n");
        renderer.append("- b");
        assert_eq!(
            renderer.message().as_str(),
            "<ul><li>a</li></ul><br><ul><li>b</li></ul>"
        );
    }

    #[test]
    fn test_render_complete_replaces() {
        let mut renderer = IncrementalRenderer::new(BufferView::new());
        renderer.append("stale");
        let markup = renderer.render_complete("# Done\n*ok*");
        assert_eq!(markup, "<h3>Done</h3><br><em>ok</em>");

        let (view, message) = renderer.into_parts();
        assert_eq!(view.markup(), "<h3>Done</h3><br><em>ok</em>");
        assert_eq!(view.replacement_count(), 1);
        assert_eq!(message.delta_count(), 0);
    }
}
