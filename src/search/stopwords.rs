use std::collections::{HashMap, HashSet};

use super::language::Language;

const ENGLISH: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of",
    "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "said", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those", "through",
    "to", "too", "under", "until", "up", "very", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours",
    "yourself", "yourselves",
];

const GERMAN: &[&str] = &[
    "aber", "alle", "allem", "allen", "aller", "als", "also", "am", "an", "ander", "andere",
    "auch", "auf", "aus", "bei", "bin", "bis", "bist", "da", "damit", "dann", "das", "dass",
    "dein", "dem", "den", "der", "des", "dich", "die", "dies", "diese", "diesem", "diesen",
    "dieser", "doch", "dort", "du", "durch", "ein", "eine", "einem", "einen", "einer", "eines",
    "er", "es", "euer", "für", "gegen", "hab", "habe", "haben", "hat", "hatte", "hier", "hin",
    "ich", "ihr", "ihre", "im", "in", "ist", "jede", "jetzt", "kann", "kein", "keine", "man",
    "mein", "mit", "muss", "nach", "nicht", "nichts", "noch", "nun", "nur", "ob", "oder", "ohne",
    "sehr", "sein", "seine", "sich", "sie", "sind", "so", "über", "um", "und", "uns", "unser",
    "unter", "vom", "von", "vor", "war", "waren", "was", "weil", "wenn", "wer", "werden", "wie",
    "wir", "wird", "wurde", "zu", "zum", "zur", "zwischen",
];

const FRENCH: &[&str] = &[
    "à", "au", "aux", "avec", "ce", "ces", "cette", "dans", "de", "des", "du", "elle", "elles",
    "en", "est", "et", "été", "être", "eu", "il", "ils", "je", "la", "le", "les", "leur",
    "leurs", "lui", "ma", "mais", "me", "même", "mes", "moi", "mon", "ne", "nos", "notre",
    "nous", "on", "ont", "ou", "où", "par", "pas", "pour", "qu", "que", "qui", "sa", "sans",
    "se", "ses", "son", "sont", "sur", "ta", "te", "tes", "toi", "ton", "tu", "un", "une",
    "vos", "votre", "vous", "y", "était", "sont", "plus", "tout", "comme", "aussi", "fait",
];

const SPANISH: &[&str] = &[
    "a", "al", "algo", "ante", "antes", "como", "con", "contra", "cual", "cuando", "de", "del",
    "desde", "donde", "durante", "e", "el", "ella", "ellas", "ellos", "en", "entre", "era",
    "es", "esa", "ese", "eso", "esta", "está", "estas", "este", "esto", "estos", "fue", "ha",
    "han", "hasta", "hay", "la", "las", "le", "les", "lo", "los", "más", "me", "mi", "muy",
    "nada", "ni", "no", "nos", "nosotros", "o", "otra", "otro", "para", "pero", "poco", "por",
    "porque", "que", "qué", "se", "sea", "ser", "si", "sí", "sin", "sobre", "son", "su", "sus",
    "también", "tiene", "todo", "todos", "tu", "un", "una", "uno", "unos", "y", "ya", "yo",
];

const CHINESE: &[&str] = &[
    "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "一个", "上", "也",
    "很", "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好", "自己", "这", "那",
    "他", "她", "它", "们", "我们", "你们", "他们", "这个", "那个", "因为", "所以", "但是",
    "如果", "已经", "可以", "以及", "或者", "而且", "还是", "就是", "这些", "那些", "什么",
    "怎么", "为什么", "对于", "关于", "通过", "进行", "其中", "之后", "之前",
];

const RUSSIAN: &[&str] = &[
    "а", "без", "более", "бы", "был", "была", "были", "было", "быть", "в", "вам", "вас",
    "весь", "во", "вот", "все", "всего", "всех", "вы", "где", "да", "даже", "для", "до", "его",
    "ее", "её", "если", "есть", "еще", "ещё", "же", "за", "здесь", "и", "из", "или", "им",
    "их", "к", "как", "когда", "кто", "ли", "либо", "мне", "может", "мы", "на", "над", "надо",
    "наш", "не", "него", "нее", "нет", "ни", "них", "но", "ну", "о", "об", "однако", "он",
    "она", "они", "оно", "от", "очень", "по", "под", "при", "с", "со", "так", "также", "такой",
    "там", "те", "тем", "то", "того", "тоже", "той", "только", "том", "ты", "у", "уже", "хотя",
    "чего", "чей", "чем", "что", "чтобы", "чье", "эта", "эти", "это", "я",
];

const ITALIAN: &[&str] = &[
    "a", "ad", "al", "alla", "alle", "anche", "avere", "c", "che", "chi", "ci", "come", "con",
    "contro", "cui", "da", "dal", "dalla", "dei", "del", "della", "delle", "di", "dove", "e",
    "è", "ed", "era", "essere", "fra", "gli", "ha", "hanno", "ho", "i", "il", "in", "io", "l",
    "la", "le", "lei", "li", "lo", "loro", "lui", "ma", "mi", "mio", "ne", "nei", "nel",
    "nella", "noi", "non", "nostro", "o", "per", "perché", "più", "quale", "quando", "quella",
    "quello", "questa", "questo", "se", "sei", "si", "sia", "sono", "su", "sua", "sul", "sulla",
    "suo", "tra", "tu", "tutto", "un", "una", "uno", "voi",
];

const PORTUGUESE: &[&str] = &[
    "a", "ao", "aos", "aquela", "aquele", "as", "até", "com", "como", "da", "das", "de",
    "dela", "dele", "do", "dos", "e", "é", "ela", "elas", "ele", "eles", "em", "entre", "era",
    "essa", "esse", "esta", "está", "este", "eu", "foi", "há", "isso", "isto", "já", "lhe",
    "mais", "mas", "me", "mesmo", "meu", "minha", "muito", "na", "não", "nas", "nem", "no",
    "nos", "nós", "num", "numa", "o", "os", "ou", "para", "pela", "pelo", "por", "qual",
    "quando", "que", "quem", "se", "sem", "ser", "seu", "sua", "são", "também", "te", "tem",
    "um", "uma", "você", "vocês",
];

/// Per-language stop-word tables. Built once, then shared read-only.
#[derive(Debug)]
pub struct StopWords {
    tables: HashMap<Language, HashSet<&'static str>>,
}

impl StopWords {
    pub fn new() -> Self {
        let tables = Language::ALL
            .into_iter()
            .map(|lang| (lang, Self::words_for(lang).iter().copied().collect()))
            .collect();
        Self { tables }
    }

    fn words_for(lang: Language) -> &'static [&'static str] {
        match lang {
            Language::English => ENGLISH,
            Language::German => GERMAN,
            Language::French => FRENCH,
            Language::Spanish => SPANISH,
            Language::Chinese => CHINESE,
            Language::Russian => RUSSIAN,
            Language::Italian => ITALIAN,
            Language::Portuguese => PORTUGUESE,
        }
    }

    /// `word` must already be lowercased.
    pub fn contains(&self, lang: Language, word: &str) -> bool {
        self.tables
            .get(&lang)
            .or_else(|| self.tables.get(&Language::English))
            .is_some_and(|set| set.contains(word))
    }
}

impl Default for StopWords {
    fn default() -> Self {
        Self::new()
    }
}
