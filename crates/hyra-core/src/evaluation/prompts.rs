//! Prompt templates for the quality judges

/// Combined accuracy score and pass/fail verdict for a generated answer
pub fn verifier_prompt(question: &str, output: &str) -> String {
    format!(
        r#"You are verifying the answer a language model gave to a user's question.

Decide whether the answer is correct and responsive, and estimate how accurate it is.
- "accuracy" is a number from 0.0 (wrong or missing) to 1.0 (fully correct).
- "passed" is true only if the answer is acceptable as given.
- Ignore formatting, punctuation and extra explanation.

Respond with a single JSON object and nothing else:
{{"accuracy": <number between 0 and 1>, "passed": <true or false>}}

Question: "{question}"
Model answer: "{output}"
"#
    )
}

/// Verifier variant for domains without a single correct answer
pub fn subjective_verifier_prompt(question: &str, output: &str) -> String {
    format!(
        r#"You are reviewing the answer a language model gave to an open-ended request.
There is no single correct answer; judge whether the answer is coherent, relevant
and responsive to what was asked.
- "accuracy" is a number from 0.0 (nonsensical or off-topic) to 1.0 (fully appropriate).
- "passed" is true only if the answer is an acceptable response to the request.

Respond with a single JSON object and nothing else:
{{"accuracy": <number between 0 and 1>, "passed": <true or false>}}

Request: "{question}"
Model answer: "{output}"
"#
    )
}

/// Fluency only: readability and grammar, never correctness
pub fn fluency_prompt(output: &str) -> String {
    format!(
        r#"You are rating the fluency of a piece of text.

Fluency means readability, clarity and grammatical correctness. Do not consider
whether the content is factually right.
- 1.0: clear, natural and grammatical
- 0.6 to 0.9: mostly fluent with minor issues
- 0.3 to 0.6: awkward, unclear or error-prone
- 0.0 to 0.3: very hard to read

Respond with a single JSON object and nothing else:
{{"score": <number between 0 and 1>, "reason": "<short reason>"}}

Text: "{output}"
"#
    )
}

/// Accuracy against a reference answer
pub fn accuracy_prompt(question: &str, expected: &str, output: &str) -> String {
    format!(
        r#"You are grading a model's answer against a reference answer.

Only the presence and correctness of the reference answer matters; ignore
formatting and extra explanation.
- Reference answer clearly present: close to 1.0
- Partially correct or ambiguous: 0.3 to 0.7
- Missing or wrong: 0.0

Respond with a single JSON object and nothing else:
{{"score": <number between 0 and 1>, "reason": "<short reason>"}}

Question: "{question}"
Reference answer: "{expected}"
Model answer: "{output}"
"#
    )
}

/// Plausibility for domains without a single correct answer
pub fn subjective_accuracy_prompt(question: &str, output: &str) -> String {
    format!(
        r#"You are grading a model's answer to an open-ended question that has no
single correct answer. Judge only whether the answer makes sense for the question.
- Coherent, relevant and responsive: 0.8 to 1.0
- Relevant but shallow, generic or incomplete: 0.4 to 0.8
- Vague or barely related: 0.2 to 0.4
- Nonsensical or off-topic: 0.0 to 0.2

Respond with a single JSON object and nothing else:
{{"score": <number between 0 and 1>, "reason": "<short reason>"}}

Question: "{question}"
Model answer: "{output}"
"#
    )
}
