use ammonia::Builder;
use serde_json::Value;
use std::collections::HashSet;

// 允许的标签：块级、格式化、链接、图片、表格
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "blockquote", "pre", "br",
    "hr",
];
const FORMAT_TAGS: &[&str] = &[
    "b", "i", "u", "s", "strong", "em", "small", "sub", "sup", "code", "span", "strike", "mark",
];
const LINK_TAGS: &[&str] = &["a"];
const IMAGE_TAGS: &[&str] = &["img"];
const TABLE_TAGS: &[&str] = &[
    "table", "thead", "tbody", "tfoot", "tr", "th", "td", "caption", "colgroup", "col",
];

const STYLE_PROPERTIES: &[&str] = &[
    "color",
    "background-color",
    "font-size",
    "font-weight",
    "font-style",
    "text-align",
    "text-decoration",
    "margin",
    "padding",
    "border",
];

/// HTML 白名单清洗器，未列出的标签和所有脚本内容都会被剥离
pub struct HtmlSanitizer {
    cleaner: Builder<'static>,
}

impl HtmlSanitizer {
    pub fn new() -> Self {
        let tags: HashSet<&'static str> = BLOCK_TAGS
            .iter()
            .chain(FORMAT_TAGS)
            .chain(LINK_TAGS)
            .chain(IMAGE_TAGS)
            .chain(TABLE_TAGS)
            .copied()
            .collect();

        let mut cleaner = Builder::empty();
        cleaner
            .tags(tags)
            .clean_content_tags(["script", "style"].into_iter().collect())
            .add_tag_attributes("a", &["href", "title"])
            .add_tag_attributes("img", &["src", "alt", "title", "width", "height"])
            .add_tag_attributes("td", &["colspan", "rowspan"])
            .add_tag_attributes("th", &["colspan", "rowspan"])
            .add_generic_attributes(&["style"])
            .filter_style_properties(STYLE_PROPERTIES.iter().copied().collect())
            .url_schemes(["http", "https", "mailto"].into_iter().collect())
            .link_rel(Some("noopener noreferrer nofollow"))
            .strip_comments(true);

        Self { cleaner }
    }

    pub fn clean(&self, input: &str) -> String {
        // 纯文本不经过 HTML 解析，避免对普通字符做实体转义
        if !input.contains(['<', '>', '&']) {
            return input.to_string();
        }
        let cleaned = self.cleaner.clean(input).to_string();
        // 只做了转义、没有剥离任何标记时保留原文，URL 中的 & 等不能被改写
        if cleaned == escape_text(input) {
            return input.to_string();
        }
        cleaned
    }

    /// 递归清洗任意嵌套的 JSON，只处理字符串叶子
    pub fn clean_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => {
                let cleaned = self.clean(s);
                if cleaned != *s {
                    *s = cleaned;
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.clean_value(v)),
            Value::Object(map) => map.values_mut().for_each(|v| self.clean_value(v)),
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    /// 清洗 urlencoded 参数（查询串或表单），返回 None 表示无需改写
    pub fn clean_form(&self, encoded: &str) -> Option<String> {
        let mut changed = false;
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(encoded.as_bytes())
            .map(|(k, v)| {
                let cleaned = self.clean(&v);
                if cleaned != v {
                    changed = true;
                }
                (k.into_owned(), cleaned)
            })
            .collect();

        if !changed {
            return None;
        }
        Some(
            url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish(),
        )
    }
}

/// 与 HTML 序列化器对文本节点的转义规则一致
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\u{a0}' => escaped.push_str("&nbsp;"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl Default for HtmlSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
