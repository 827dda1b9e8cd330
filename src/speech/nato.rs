/// Spells a ticker with the NATO alphabet, e.g. "AB1" -> "alpha, bravo, one".
/// Characters without a code word are skipped.
pub fn spell_nato(ticker: &str) -> String {
    ticker
        .trim()
        .chars()
        .filter_map(|c| code_word(c.to_ascii_uppercase()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn code_word(c: char) -> Option<&'static str> {
    let word = match c {
        'A' => "alpha",
        'B' => "bravo",
        'C' => "charlie",
        'D' => "delta",
        'E' => "echo",
        'F' => "foxtrot",
        'G' => "golf",
        'H' => "hotel",
        'I' => "india",
        'J' => "juliett",
        'K' => "kilo",
        'L' => "lima",
        'M' => "mike",
        'N' => "november",
        'O' => "oscar",
        'P' => "papa",
        'Q' => "quebec",
        'R' => "romeo",
        'S' => "sierra",
        'T' => "tango",
        'U' => "uniform",
        'V' => "victor",
        'W' => "whiskey",
        'X' => "x-ray",
        'Y' => "yankee",
        'Z' => "zulu",
        '0' => "zero",
        '1' => "one",
        '2' => "two",
        '3' => "three",
        '4' => "four",
        '5' => "five",
        '6' => "six",
        '7' => "seven",
        '8' => "eight",
        '9' => "nine",
        _ => return None,
    };
    Some(word)
}
