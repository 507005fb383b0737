//! Exercise catalogue, greeting and coaching instructions.
//!
//! Exercise identifiers are free-form tags (`KNEE_BEND`, `general`, ...).
//! Everything here is a pure function of the identifier.

/// Exercises the coaching instructions describe, with their clinical goal.
pub const SUPPORTED_EXERCISES: &[(&str, &str)] = &[
    ("KNEE_BEND", "Post knee surgery recovery (target: 90 degree knee flexion)"),
    ("SHOULDER_ROTATION", "Shoulder rehabilitation (full 180 degree arc)"),
    ("HIP_ABDUCTION", "Hip replacement recovery (45 degree abduction)"),
    ("ANKLE_PUMP", "DVT prevention"),
    ("QUAD_SET", "Quadriceps strengthening"),
    ("SLR", "Straight leg raise (45 degree lift, knee straight)"),
];

const BASE_INSTRUCTIONS: &str = "\
You are REHAB AI, an expert real-time physical therapy coach. You speak with a calm,
precise and occasionally dry-humored voice.

You watch patients perform rehabilitation exercises via their camera.
Use this to give precise real-time voice coaching.

## Coaching Rules
- Give feedback ONLY when you detect something worth saying
- Keep responses SHORT (1-2 sentences max)
- Count reps: \"Rep 3 complete. Good control.\"
- Correct form: \"Left shoulder dropping. Keep both level.\"
- Good form: \"Perfect. Hold that position.\"
- End of set: \"Set complete. Rest 30 seconds.\"

## Jarvis Tone
- \"Initiating analysis. Assume starting position when ready.\"
- \"Angle at 67 degrees. You need 90. Push deeper — there you go.\"
- \"I am detecting shoulder compensation. Keep your torso still.\"
- \"Excellent. That is your best repetition today.\"
";

/// Turns an identifier like `KNEE_BEND` into `Knee Bend`.
///
/// Underscores become spaces; each letter that follows a non-letter is
/// upper-cased and every other letter lower-cased.
pub fn display_name(exercise: &str) -> String {
    let mut out = String::with_capacity(exercise.len());
    let mut prev_alpha = false;
    for ch in exercise.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

/// The first utterance of a session, announcing the loaded protocol.
pub fn greeting(exercise: &str) -> String {
    format!(
        "REHAB AI online. {} protocol loaded. \
         Initiating analysis. Assume starting position when ready.",
        display_name(exercise)
    )
}

/// System instructions handed to the language model for one session.
pub fn coaching_instructions(exercise: &str) -> String {
    let mut text = String::from(BASE_INSTRUCTIONS);
    text.push_str("\n## Supported Exercises\n");
    for (idx, (id, goal)) in SUPPORTED_EXERCISES.iter().enumerate() {
        text.push_str(&format!("{}. {id:<18} {goal}\n", idx + 1));
    }
    text.push_str(&format!("\nCurrent exercise: {exercise}"));
    text
}

/// Returns `true` if the identifier names one of [`SUPPORTED_EXERCISES`].
pub fn is_supported(exercise: &str) -> bool {
    SUPPORTED_EXERCISES
        .iter()
        .any(|(id, _)| id.eq_ignore_ascii_case(exercise))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knee_bend_greeting() {
        let text = greeting("KNEE_BEND");
        assert!(text.contains("Knee Bend"));
        assert!(text.to_lowercase().contains("protocol loaded"));
        assert_eq!(text, greeting("KNEE_BEND"));
    }

    #[test]
    fn instructions_carry_the_coaching_voice() {
        let text = coaching_instructions("SQUAT");
        let tone = text.find("## Jarvis Tone").unwrap();
        assert!(text.find("## Coaching Rules").unwrap() < tone);
        assert!(text.contains("Keep your torso still."));
        assert!(text.ends_with("Current exercise: SQUAT"));
    }

    #[test]
    fn display_name_title_cases() {
        assert_eq!(display_name("SHOULDER_ROTATION"), "Shoulder Rotation");
        assert_eq!(display_name("general"), "General");
        assert_eq!(display_name("SLR"), "Slr");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn instructions_name_current_exercise() {
        let text = coaching_instructions("ANKLE_PUMP");
        assert!(text.ends_with("Current exercise: ANKLE_PUMP"));
        assert!(text.contains("HIP_ABDUCTION"));
    }

    #[test]
    fn supported_lookup_ignores_case() {
        assert!(is_supported("knee_bend"));
        assert!(!is_supported("general"));
    }
}
