//! Offline responder backed by canned phrases.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::orchestrator::error::ResponderError;
use crate::orchestrator::traits::{Responder, ResponderReply, ResponderRequest};
use crate::orchestrator::types::{Difficulty, Topic};

const HOW_ARE_YOU_REPLY: &str = "Estoy muy bien, gracias por preguntar. ¿Y tú cómo estás?";
const THANKS_REPLY: &str = "De nada. Estoy aquí para ayudarte a practicar tu español.";
const NOT_UNDERSTOOD_BEGINNER: &str =
    "No hay problema. Vamos a intentarlo de nuevo más despacio. ¿Qué parte no entendiste?";
const NOT_UNDERSTOOD: &str = "Déjame explicártelo de otra manera para que sea más claro.";

fn phrases(topic: Topic, difficulty: Difficulty) -> &'static [&'static str; 5] {
    match (topic, difficulty) {
        (Topic::General, Difficulty::Beginner) => &[
            "¡Hola! ¿Cómo estás hoy?",
            "Muy bien. ¿Cómo te llamas?",
            "Encantado de conocerte. ¿De dónde eres?",
            "¿Cuánto tiempo llevas estudiando español?",
            "¿Qué te gusta hacer en tu tiempo libre?",
        ],
        (Topic::General, Difficulty::Intermediate) => &[
            "¡Qué bueno verte de nuevo! ¿Qué has hecho esta semana?",
            "Eso suena interesante. Cuéntame más sobre esa experiencia.",
            "¿Has viajado alguna vez a un país hispanohablante?",
            "¿Qué tipo de música te gusta escuchar?",
            "¿Cuáles son tus planes para el futuro?",
        ],
        (Topic::General, Difficulty::Advanced) => &[
            "Me parece fascinante lo que comentas. ¿Crees que esa perspectiva es común en tu cultura?",
            "Si tuvieras la oportunidad de vivir en cualquier país hispanohablante, ¿cuál elegirías y por qué?",
            "¿Cómo crees que el aprendizaje de idiomas ha influido en tu forma de ver el mundo?",
            "¿Qué opinas sobre las diferencias culturales entre los distintos países de habla hispana?",
            "Hablemos de algún tema de actualidad. ¿Qué noticias has seguido últimamente?",
        ],
        (Topic::Travel, Difficulty::Beginner) => &[
            "¿A dónde te gustaría viajar?",
            "¿Necesitas ayuda para encontrar un hotel?",
            "El autobús sale a las diez de la mañana.",
            "¿Puedes recomendarme un buen restaurante cerca?",
            "¿Dónde está la estación de tren?",
        ],
        (Topic::Travel, Difficulty::Intermediate) => &[
            "¿Has tenido algún problema durante tu viaje hasta ahora?",
            "Te recomendaría visitar el museo que está en el centro de la ciudad.",
            "¿Prefieres alojarte en un hotel o en un apartamento turístico?",
            "¿Qué tipo de actividades te gustaría hacer durante tu estancia?",
            "¿Cómo planeas moverte por la ciudad? Hay varias opciones de transporte.",
        ],
        (Topic::Travel, Difficulty::Advanced) => &[
            "Si comparas este destino con otros que has visitado, ¿qué aspectos destacarías como únicos?",
            "La cultura local tiene algunas costumbres particulares. Por ejemplo, las tiendas cierran durante varias horas al mediodía para la siesta.",
            "La arquitectura de esta zona refleja la influencia de diferentes culturas a lo largo de los siglos.",
            "¿Qué impresión te ha causado la gastronomía local? ¿Has probado algún plato típico que te haya sorprendido?",
            "Para experimentar verdaderamente la cultura local, te recomendaría participar en alguna de las festividades tradicionales.",
        ],
        (Topic::Restaurant, Difficulty::Beginner) => &[
            "¿Qué te gustaría comer hoy?",
            "¿Prefieres carne o pescado?",
            "¿Tienes alguna alergia alimentaria?",
            "La especialidad de la casa es la paella.",
            "¿Puedo traerte algo más?",
        ],
        (Topic::Restaurant, Difficulty::Intermediate) => &[
            "¿Te gustaría probar alguno de nuestros vinos locales con la comida?",
            "Este plato se prepara con ingredientes frescos de temporada.",
            "La receta de este plato ha pasado de generación en generación en la familia del chef.",
            "¿Prefieres una mesa en la terraza o dentro del restaurante?",
            "¿Puedo recomendarte nuestro menú de degustación para conocer mejor nuestra cocina?",
        ],
        (Topic::Restaurant, Difficulty::Advanced) => &[
            "Este plato representa la fusión de la cocina tradicional con técnicas modernas de la gastronomía molecular.",
            "El maridaje que sugiere nuestro sumiller realza los sabores complejos de este plato.",
            "La sostenibilidad es un valor fundamental en nuestro restaurante. Todos nuestros ingredientes son de proximidad y de temporada.",
            "¿Qué opinas sobre las nuevas tendencias en la gastronomía española contemporánea?",
            "Este postre reinventa un dulce tradicional, manteniendo su esencia pero con un enfoque innovador.",
        ],
        (Topic::Shopping, Difficulty::Beginner) => &[
            "¿Puedo ayudarte a encontrar algo en particular?",
            "¿Qué talla necesitas?",
            "Este producto cuesta veinte euros.",
            "El probador está al fondo a la derecha.",
            "¿Pagarás con tarjeta o en efectivo?",
        ],
        (Topic::Shopping, Difficulty::Intermediate) => &[
            "Tenemos una oferta especial: si compras dos prendas, la tercera es a mitad de precio.",
            "Este modelo está disponible en varios colores. ¿Tienes alguna preferencia?",
            "Este material es muy duradero y fácil de lavar a máquina.",
            "Si no estás satisfecho con tu compra, puedes devolverla en un plazo de 30 días.",
            "¿Prefieres un estilo más clásico o algo más actual?",
        ],
        (Topic::Shopping, Difficulty::Advanced) => &[
            "Esta prenda está elaborada con técnicas artesanales tradicionales que se remontan al siglo XVIII.",
            "Nuestra política de comercio justo garantiza condiciones laborales dignas para todos los trabajadores involucrados en la producción.",
            "Este diseñador se ha inspirado en elementos de la arquitectura modernista para crear esta colección exclusiva.",
            "¿Qué opinas sobre la tendencia actual hacia la moda sostenible y ética?",
            "El tejido utilizado en esta prenda es innovador porque combina fibras naturales con tecnología avanzada para mayor comodidad.",
        ],
        (Topic::Emergency, Difficulty::Beginner) => &[
            "¿Cuál es la emergencia?",
            "¿Necesitas un médico?",
            "La farmacia más cercana está en la esquina.",
            "Llame al 112 para emergencias.",
            "¿Eres alérgico a algún medicamento?",
        ],
        (Topic::Emergency, Difficulty::Intermediate) => &[
            "Describa los síntomas que está experimentando, por favor.",
            "¿Desde cuándo ha estado sintiendo este dolor?",
            "¿Tiene alguna condición médica preexistente que debamos conocer?",
            "El hospital más cercano está a unos diez minutos en coche.",
            "¿Hay alguien a quien debamos contactar para informarle de su situación?",
        ],
        (Topic::Emergency, Difficulty::Advanced) => &[
            "Basándome en los síntomas que describe, podría tratarse de una reacción alérgica. ¿Ha estado expuesto a algún alérgeno conocido recientemente?",
            "Es importante que mantengamos monitorizados sus signos vitales hasta que lleguen los servicios de emergencia.",
            "La asistencia sanitaria en este país funciona de manera diferente al suyo. Primero necesitaremos verificar su seguro de viaje.",
            "En situaciones como esta, es fundamental mantener la calma para poder comunicar claramente toda la información necesaria al personal médico.",
            "¿Podría detallar su historial médico? Cualquier información sobre condiciones crónicas, operaciones previas o medicación actual sería de gran ayuda.",
        ],
    }
}

/// Keyword rules first, then a deterministic rotation through the phrases for
/// the current topic and level.
#[derive(Debug, Default)]
pub struct PhraseTableResponder {
    cursor: AtomicUsize,
}

impl PhraseTableResponder {
    pub fn new() -> Self {
        Self::default()
    }

    fn reply_for(&self, user_text: &str, topic: Topic, difficulty: Difficulty) -> String {
        let lower = user_text.to_lowercase();

        if lower.contains("cómo estás") {
            return HOW_ARE_YOU_REPLY.to_string();
        }

        if let Some(name) = introduced_name(&lower) {
            return format!("¡Encantado de conocerte, {name}! ¿De dónde eres?");
        }

        if lower.contains("no entiendo") {
            let reply = if difficulty == Difficulty::Beginner {
                NOT_UNDERSTOOD_BEGINNER
            } else {
                NOT_UNDERSTOOD
            };
            return reply.to_string();
        }

        if lower.contains("gracias") || lower.contains("thank") {
            return THANKS_REPLY.to_string();
        }

        let table = phrases(topic, difficulty);
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % table.len();
        table[index].to_string()
    }
}

fn introduced_name(lower: &str) -> Option<String> {
    let (_, rest) = lower.split_once("me llamo")?;
    let word = rest.split_whitespace().next()?;
    let word = word.trim_matches(|c: char| !c.is_alphabetic());
    let mut chars = word.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

#[async_trait]
impl Responder for PhraseTableResponder {
    async fn respond(&self, request: ResponderRequest) -> Result<ResponderReply, ResponderError> {
        let reply = self.reply_for(&request.user_text, request.topic, request.difficulty);
        debug!(
            target: "responder",
            responder = self.name(),
            topic = %request.topic,
            difficulty = %request.difficulty,
            "phrase table reply"
        );
        Ok(ResponderReply::extending(&request, reply))
    }

    fn name(&self) -> &'static str {
        "phrase_table"
    }
}
