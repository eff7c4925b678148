// src/utils/html.rs

use crate::models::assessment::Question;

/// Whitelist-based HTML sanitization for user-authored text.
///
/// Safe formatting tags (<b>, <p>, <code>) survive; <script>, <iframe> and event
/// attributes are stripped together with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Sanitizes every free-text field of an answer key in place.
pub fn clean_questions(questions: &mut [Question]) {
    for q in questions {
        q.text = clean_html(&q.text);
        q.options.a = clean_html(&q.options.a);
        q.options.b = clean_html(&q.options.b);
        q.options.c = clean_html(&q.options.c);
        q.options.d = clean_html(&q.options.d);
        q.explanation = q.explanation.as_deref().map(clean_html);
    }
}
