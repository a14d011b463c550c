//! JavaScript snippets run against resolved elements
//!
//! Each script receives element references through `arguments`.

/// Outline the element so recordings show what was touched
pub const HIGHLIGHT_SCRIPT: &str =
    "arguments[0].style.outline = '3px solid #ff3b30'; arguments[0].style.outlineOffset = '1px';";

pub const SCROLL_INTO_VIEW_SCRIPT: &str =
    "arguments[0].scrollIntoView({block: 'center', inline: 'center'});";

pub const HOVER_SCRIPT: &str = r#"
const el = arguments[0];
for (const type of ['mouseover', 'mouseenter', 'mousemove']) {
    el.dispatchEvent(new MouseEvent(type, {bubbles: true, cancelable: true, view: window}));
}
"#;

/// HTML5 drag and drop between `arguments[0]` and `arguments[1]`
pub const DRAG_AND_DROP_SCRIPT: &str = r#"
const source = arguments[0];
const target = arguments[1];
const data = new DataTransfer();
const fire = (el, type) => el.dispatchEvent(
    new DragEvent(type, {bubbles: true, cancelable: true, dataTransfer: data})
);
fire(source, 'dragstart');
fire(target, 'dragenter');
fire(target, 'dragover');
fire(target, 'drop');
fire(source, 'dragend');
"#;
