use crate::orchestrator::types::{Difficulty, Topic};

fn level_label(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Beginner => "básico/principiante (A1-A2)",
        Difficulty::Intermediate => "intermedio (B1-B2)",
        Difficulty::Advanced => "avanzado (C1-C2)",
    }
}

fn topic_label(topic: Topic) -> &'static str {
    match topic {
        Topic::General => "conversación general",
        Topic::Travel => "viajes y turismo",
        Topic::Restaurant => "restaurantes y comida",
        Topic::Shopping => "compras",
        Topic::Emergency => "situaciones de emergencia",
    }
}

/// Instructions sent as the first history entry of every conversation.
pub fn system_prompt(difficulty: Difficulty, topic: Topic) -> String {
    let rules = [
        format!("Nivel del estudiante: {}", level_label(difficulty)),
        format!("Tema de conversación: {}", topic_label(topic)),
        "Responde SIEMPRE en español.".to_string(),
        "Para nivel principiante: usa frases sencillas, vocabulario básico y habla despacio."
            .to_string(),
        "Para nivel intermedio: usa gramática más compleja y vocabulario más variado.".to_string(),
        "Para nivel avanzado: usa español natural, expresiones idiomáticas y vocabulario sofisticado."
            .to_string(),
        "Mantén tus respuestas concisas (aproximadamente 1-3 oraciones) ya que se leerán en voz alta."
            .to_string(),
        "Tu objetivo es mantener una conversación natural y ayudar al estudiante a mejorar su fluidez en español."
            .to_string(),
        "Anima al estudiante y ofrece correcciones sutiles si es necesario.".to_string(),
    ];

    let mut prompt = String::from(
        "Eres un tutor español amable y paciente que ayuda a los estudiantes a practicar su español hablado.",
    );
    for rule in rules {
        prompt.push_str("\n- ");
        prompt.push_str(&rule);
    }
    prompt
}
