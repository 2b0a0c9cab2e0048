use itertools::Itertools;

/// Helper trait which can be used to display symbols, words and outputs in a compact way.
/// This is mainly used for log output and debugging purposes.
pub trait Show {
    /// Returns a human readable representation of `self`.
    fn show(&self) -> String;

    /// Show a collection of the thing. For a word over `char`s this should be `"abc"`, other
    /// types fall back to a bracketed, comma separated list.
    fn show_collection<'a, I>(iter: I) -> String
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        format!("[{}]", iter.into_iter().map(|x| x.show()).join(", "))
    }
}

impl Show for char {
    fn show(&self) -> String {
        self.to_string()
    }

    fn show_collection<'a, I: IntoIterator<Item = &'a Self>>(iter: I) -> String
    where
        Self: 'a,
    {
        let word: String = iter.into_iter().collect();
        if word.is_empty() {
            "ε".to_string()
        } else {
            format!("\"{word}\"")
        }
    }
}

impl Show for bool {
    fn show(&self) -> String {
        match self {
            true => "+",
            false => "-",
        }
        .to_string()
    }
}

macro_rules! impl_show_for_integers {
    ($($t:ty),*) => {
        $(
            impl Show for $t {
                fn show(&self) -> String {
                    self.to_string()
                }
            }
        )*
    }
}

impl_show_for_integers!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl Show for str {
    fn show(&self) -> String {
        self.to_string()
    }
}

impl Show for String {
    fn show(&self) -> String {
        self.clone()
    }
}

impl Show for () {
    fn show(&self) -> String {
        "-".into()
    }
}

impl<S: Show> Show for [S] {
    fn show(&self) -> String {
        S::show_collection(self.iter())
    }
}

impl<S: Show> Show for Vec<S> {
    fn show(&self) -> String {
        S::show_collection(self.iter())
    }
}

impl<S: Show> Show for Option<S> {
    fn show(&self) -> String {
        match self {
            None => "⊥".to_string(),
            Some(x) => x.show(),
        }
    }
}

impl<S: Show, T: Show> Show for (S, T) {
    fn show(&self) -> String {
        format!("({}, {})", self.0.show(), self.1.show())
    }
}

impl<S: Show + ?Sized> Show for &S {
    fn show(&self) -> String {
        S::show(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::Show;

    #[test]
    fn show_words() {
        assert_eq!(vec!['a', 'b'].show(), "\"ab\"");
        assert_eq!(Vec::<char>::new().show(), "ε");
        assert_eq!(vec![1u8, 2].show(), "[1, 2]");
        assert_eq!(vec![true, false].show(), "[+, -]");
        assert_eq!((Some('a'), None::<char>).show(), "(a, ⊥)");
    }
}
