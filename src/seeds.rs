//! Built-in offline content: the listening bank (one task per level), speaking topics,
//! and writing prompts. Guarantees a usable task without configuration or AI access.

use rand::Rng;

use crate::config::TopicCfg;
use crate::domain::{ExerciseTask, McQuestion, Modality, ProficiencyLevel, TaskPayload, TaskSource};

pub const LISTENING_INSTRUCTIONS: &str = "Listen to the audio. Then answer the questions.";

struct ListeningSeed {
  title: &'static str,
  passage: &'static str,
  questions: [(&'static str, [&'static str; 4], &'static str, &'static str); 3],
}

fn listening_seed(level: ProficiencyLevel) -> ListeningSeed {
  match level {
    ProficiencyLevel::A2 => ListeningSeed {
      title: "A morning at the café",
      passage: "Sofia goes to a small café near her home. She orders a coffee and a sandwich. \
        The café is busy, so she waits for ten minutes. When her food arrives, she sits by the window \
        and watches people walking in the street.",
      questions: [
        ("Where does Sofia go?",
          ["To a café near her home", "To a park", "To a supermarket", "To a library"],
          "To a café near her home", "The passage says she goes to a small café near her home."),
        ("Why does she wait for ten minutes?",
          ["Because the café is busy", "Because she forgot her money", "Because the café is closed", "Because she meets a friend"],
          "Because the café is busy", "It explicitly says the café is busy."),
        ("Where does she sit?",
          ["By the window", "Outside", "Near the kitchen", "At the bar"],
          "By the window", "It says she sits by the window."),
      ],
    },
    ProficiencyLevel::B1 => ListeningSeed {
      title: "A new hobby",
      passage: "Last month, Daniel decided to learn photography. At first, he used his phone, but soon he bought a simple camera. \
        Every Saturday morning, he walks around his city and takes pictures of buildings and markets. \
        He uploads his best photos online and asks for feedback. Little by little, he is improving.",
      questions: [
        ("Why did Daniel buy a camera?",
          ["He wanted better photos than his phone", "His phone was lost", "He needed it for work", "A friend gave him money"],
          "He wanted better photos than his phone", "He started with a phone, then bought a camera to improve."),
        ("When does he practice?",
          ["Every Saturday morning", "Every evening", "On Sundays", "Only on holidays"],
          "Every Saturday morning", "The passage says every Saturday morning."),
        ("How does he improve?",
          ["He asks for feedback online", "He stops taking photos", "He only reads books", "He changes cities"],
          "He asks for feedback online", "He uploads and asks for feedback."),
      ],
    },
    ProficiencyLevel::B2 => ListeningSeed {
      title: "Remote work changes",
      passage: "Many companies introduced remote work to reduce costs and offer employees more flexibility. \
        However, some managers noticed that new employees sometimes felt isolated and learned more slowly. \
        To solve this, several teams created short daily check-ins and paired newcomers with mentors. \
        These changes helped people feel connected without removing the benefits of working from home.",
      questions: [
        ("What problem did some new employees have?",
          ["They felt isolated", "They were paid less", "They had no internet", "They moved abroad"],
          "They felt isolated", "It says new employees sometimes felt isolated."),
        ("What solution is mentioned?",
          ["Daily check-ins and mentors", "Longer meetings every day", "No communication", "Returning to full-time office work"],
          "Daily check-ins and mentors", "Those are the two measures described."),
        ("What was the goal of the changes?",
          ["To feel connected while keeping flexibility", "To remove remote work", "To reduce salaries", "To hire fewer people"],
          "To feel connected while keeping flexibility", "The final sentence states that balance."),
      ],
    },
    ProficiencyLevel::C1 => ListeningSeed {
      title: "Attention and multitasking",
      passage: "Multitasking is often praised as a modern skill, yet research suggests that frequent task switching can reduce accuracy. \
        When people jump between messages, documents, and meetings, their brains pay a 'switching cost', a short period of reorientation. \
        Over time, this can create the illusion of productivity while quietly lowering the quality of decisions.",
      questions: [
        ("What does task switching often reduce?",
          ["Accuracy", "Sleep", "Team size", "Creativity in all cases"],
          "Accuracy", "The passage says it can reduce accuracy."),
        ("What is the 'switching cost'?",
          ["A reorientation period", "A financial penalty", "A tax for companies", "A training program"],
          "A reorientation period", "It is defined in the passage."),
        ("What illusion may multitasking create?",
          ["An illusion of productivity", "An illusion of boredom", "An illusion of perfect memory", "An illusion of free time"],
          "An illusion of productivity", "It says it creates the illusion of productivity."),
      ],
    },
    ProficiencyLevel::C2 => ListeningSeed {
      title: "Interpretation and nuance",
      passage: "In complex debates, participants may agree on facts yet disagree profoundly on meaning. \
        This happens because interpretation is shaped by assumptions, values, and the context people consider relevant. \
        As a result, language becomes less a tool for transferring information and more a medium for negotiating nuance.",
      questions: [
        ("Why can people disagree even when they share facts?",
          ["Because interpretation differs", "Because facts are always false", "Because context is irrelevant", "Because language is fixed"],
          "Because interpretation differs", "It says disagreement comes from interpretation shaped by assumptions, values and context."),
        ("What shapes interpretation, according to the passage?",
          ["Assumptions, values, and context", "Only grammar rules", "Only emotions", "Only statistics"],
          "Assumptions, values, and context", "Those three are explicitly listed."),
        ("How is language described in complex debates?",
          ["A medium for negotiating nuance", "A perfect calculator", "Only a dictionary", "A barrier to meaning"],
          "A medium for negotiating nuance", "That is the final point."),
      ],
    },
  }
}

/// Fixed listening task for `level`. Same level, same task and fingerprint.
pub fn fallback_listening(level: ProficiencyLevel) -> ExerciseTask {
  let seed = listening_seed(level);
  let questions = seed
    .questions
    .iter()
    .map(|(q, opts, answer, why)| McQuestion {
      question: q.to_string(),
      options: opts.iter().map(|o| o.to_string()).collect(),
      answer: answer.to_string(),
      why: why.to_string(),
    })
    .collect();
  ExerciseTask::new(
    Modality::Listening,
    level,
    seed.title.into(),
    TaskPayload::Listening {
      instructions: LISTENING_INSTRUCTIONS.into(),
      passage: seed.passage.into(),
      questions,
    },
    TaskSource::Fallback,
  )
}

const SPEAKING_TOPICS: [(&str, &str, [&str; 3]); 4] = [
  ("Daily Routine",
    "Describe your daily routine and say what you would like to improve.",
    ["What do you usually do in the morning?", "What is the hardest part of your day?", "What would you change if you had more time?"]),
  ("A Place You Love",
    "Talk about a place you love and explain why it is special to you.",
    ["Where is it and what does it look like?", "What do you do there?", "Why does it matter to you?"]),
  ("Technology in Daily Life",
    "Do you think technology makes life better or worse? Explain your opinion.",
    ["What technology do you use most?", "What are the benefits?", "What are the downsides?"]),
  ("Learning English",
    "Talk about your experience learning English and what motivates you.",
    ["What is hardest for you: speaking, listening, writing, or reading?", "What helps you improve the most?", "What is your goal for the next 3 months?"]),
];

/// Uniform pick among the built-in topics plus any configured extras.
pub fn fallback_speaking<R: Rng + ?Sized>(level: ProficiencyLevel, extra: &[TopicCfg], rng: &mut R) -> ExerciseTask {
  let pick = rng.gen_range(0..SPEAKING_TOPICS.len() + extra.len());
  let topic = match SPEAKING_TOPICS.get(pick) {
    Some((title, prompt, qs)) => TopicCfg {
      title: title.to_string(),
      prompt: prompt.to_string(),
      questions: qs.iter().map(|q| q.to_string()).collect(),
    },
    None => extra[pick - SPEAKING_TOPICS.len()].clone(),
  };
  ExerciseTask::new(
    Modality::Speaking,
    level,
    topic.title,
    TaskPayload::Prompt { prompt: topic.prompt, questions: topic.questions },
    TaskSource::Fallback,
  )
}

/// Fixed writing prompt for `level`.
pub fn fallback_writing(level: ProficiencyLevel) -> ExerciseTask {
  let (title, prompt, questions): (&str, &str, [&str; 3]) = match level {
    ProficiencyLevel::A2 => ("My weekend",
      "Write an email to a friend about what you did last weekend. Write 80 to 100 words.",
      ["Where did you go?", "Who were you with?", "What did you enjoy most?"]),
    ProficiencyLevel::B1 => ("A useful skill",
      "Write a short article for a school magazine about a skill you learned and how it helps you. Write 120 to 150 words.",
      ["How did you learn it?", "What was difficult at first?", "How do you use it now?"]),
    ProficiencyLevel::B2 => ("Working from home",
      "Write an essay discussing the advantages and disadvantages of working from home. Give your own opinion. Write 180 to 220 words.",
      ["Who benefits most?", "What problems can appear?", "What would you recommend to employers?"]),
    ProficiencyLevel::C1 => ("Cities and cars",
      "Write a proposal to your local council arguing for or against closing the city centre to private cars. Write 220 to 260 words.",
      ["What is the current situation?", "What would change for residents and businesses?", "Which measures should come first?"]),
    ProficiencyLevel::C2 => ("The value of failure",
      "Write a reflective essay on whether societies should treat failure as a necessary part of progress. Write 260 to 320 words.",
      ["How do schools and workplaces treat failure?", "What is lost when failure is punished?", "Where should the limits be?"]),
  };
  ExerciseTask::new(
    Modality::Writing,
    level,
    title.into(),
    TaskPayload::Prompt {
      prompt: prompt.into(),
      questions: questions.iter().map(|q| q.to_string()).collect(),
    },
    TaskSource::Fallback,
  )
}
