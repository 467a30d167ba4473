//! Example: convert an in-memory share page and print the result
//!
//! Run with: cargo run -p poesaver --example convert_page
//!
//! This example feeds a small hand-written page through the pipeline, so
//! it works offline and shows the shape of the output document.

use poesaver::{convert, SourceInfo};

const PAGE: &str = r#"<html>
<head><title>Borrow checker basics - Poe</title></head>
<body>
  <div class="ChatMessage_messageRow_a">
    <div class="Message_humanMessageBubble_b">
      <p>Why does the borrow checker reject my code?</p>
    </div>
  </div>
  <div class="ChatMessage_messageRow_a">
    <img alt="Bot image for Model-X" src="/avatar.png">
    <div class="Message_botMessageBubble_c">
      <p>You are holding <strong>two mutable borrows</strong>. Try:</p>
      <pre><code class="language-rust">let (left, right) = slice.split_at_mut(mid);</code></pre>
      <ul><li>one borrow per region</li><li>or use indices</li></ul>
    </div>
  </div>
</body>
</html>"#;

fn main() {
    let source = SourceInfo::new(
        "https://poe.com/s/ExampleShareId",
        "ExampleShareId",
        chrono::Utc::now(),
    );

    match convert(PAGE, &source) {
        Ok(result) => {
            let metadata = &result.conversation.metadata;
            eprintln!(
                "{} messages ({} user, {} assistant), model: {}",
                metadata.message_count,
                metadata.user_message_count,
                metadata.assistant_message_count,
                metadata.model_name
            );
            for warning in &result.warnings {
                eprintln!("warning: {warning}");
            }
            println!("{}", result.markdown);
        }
        Err(err) => {
            eprintln!("conversion failed: {err}");
            std::process::exit(1);
        }
    }
}
