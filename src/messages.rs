//! Komunikaty dla użytkownika (po polsku), wspólne dla serwera i klienta.

pub const BAD_REQUEST: &str = "Nieprawidłowe dane. Sprawdź formularz i spróbuj ponownie.";
pub const UNAUTHORIZED: &str = "Sesja wygasła lub nie jesteś zalogowany. Zaloguj się ponownie.";
pub const FORBIDDEN: &str = "Nie masz uprawnień do wykonania tej operacji.";
pub const NOT_FOUND: &str = "Nie znaleziono zasobu.";
pub const CONFLICT: &str = "Zasób już istnieje lub jest w konflikcie z innymi danymi.";
pub const TOO_MANY_REQUESTS: &str = "Zbyt wiele żądań. Spróbuj ponownie za chwilę.";
pub const SERVER_ERROR: &str = "Wystąpił błąd serwera. Spróbuj ponownie później.";
pub const SERVICE_UNAVAILABLE: &str = "Usługa AI jest chwilowo niedostępna. Spróbuj ponownie później.";
pub const NETWORK_ERROR: &str = "Brak połączenia z serwerem. Sprawdź połączenie i spróbuj ponownie.";

// auth
pub const INVALID_CREDENTIALS: &str = "Nieprawidłowy adres email lub hasło.";
pub const EMAIL_TAKEN: &str = "Konto z tym adresem email już istnieje.";
pub const INVALID_EMAIL: &str = "Podaj prawidłowy adres email.";
pub const EMAIL_REQUIRED: &str = "Adres email jest wymagany.";
pub const PASSWORD_REQUIRED: &str = "Hasło jest wymagane.";
pub const PASSWORD_LENGTH: &str = "Hasło musi mieć od 8 do 256 znaków.";
pub const RESET_LINK_SENT: &str =
    "Jeśli konto istnieje, wysłaliśmy wiadomość z instrukcją resetowania hasła.";
pub const RESET_TOKEN_INVALID: &str = "Link do resetowania hasła jest nieprawidłowy lub wygasł.";
pub const PASSWORD_CHANGED: &str = "Hasło zostało zmienione. Możesz się zalogować.";
pub const LOGGED_OUT: &str = "Wylogowano.";
pub const SESSION_REFRESHED: &str = "Sesja została odświeżona.";

// notes
pub const NOTE_NOT_FOUND: &str = "Notatka nie istnieje lub nie masz do niej dostępu.";
pub const NOTE_NOT_OWNER: &str = "Tylko właściciel może modyfikować tę notatkę.";
pub const CONTENT_REQUIRED: &str = "Treść notatki nie może być pusta.";
pub const CONTENT_TOO_LONG: &str = "Treść notatki może mieć maksymalnie 5000 znaków.";
pub const SUMMARY_TOO_LONG: &str = "Podsumowanie może mieć maksymalnie 2000 znaków.";
pub const TAG_CHOICE_REQUIRED: &str = "Wybierz istniejącą etykietę albo podaj nazwę nowej.";
pub const EMPTY_UPDATE: &str = "Nie podano żadnych zmian.";
pub const INVALID_PAGINATION: &str = "Nieprawidłowe parametry stronicowania.";
pub const INVALID_DATE_RANGE: &str = "Data początkowa nie może być późniejsza niż końcowa.";
pub const PENDING_NOTE_SAVED: &str = "Zapisano notatkę utworzoną przed zalogowaniem.";

// tags
pub const TAG_NOT_FOUND: &str = "Etykieta nie istnieje lub nie masz do niej dostępu.";
pub const TAG_NAME_TAKEN: &str = "Etykieta o tej nazwie już istnieje.";
pub const TAG_NAME_INVALID: &str = "Nazwa etykiety musi mieć od 1 do 100 znaków.";
pub const TAG_HAS_NOTES: &str = "Nie można usunąć etykiety, do której przypisane są notatki.";
pub const TAG_NOT_OWNER: &str = "Tylko właściciel może zarządzać tą etykietą.";
pub const RECIPIENT_NOT_FOUND: &str = "Nie znaleziono użytkownika o podanym adresie email.";
pub const RECIPIENT_IS_OWNER: &str = "Nie możesz udostępnić etykiety samemu sobie.";
pub const RECIPIENT_EXISTS: &str = "Ten użytkownik ma już dostęp do etykiety.";
pub const RECIPIENT_MISSING: &str = "Ten użytkownik nie ma dostępu do etykiety.";

// public links
pub const PUBLIC_LINK_NOT_FOUND: &str = "Link publiczny nie istnieje.";
pub const SHARED_NOTE_UNAVAILABLE: &str = "Ta notatka nie jest już publicznie dostępna.";
pub const ROTATE_NOT_CONFIRMED: &str = "Potwierdź wygenerowanie nowego linku.";

// account
pub const ACCOUNT_DELETED: &str = "Konto zostało usunięte.";
pub const WRONG_PASSWORD: &str = "Nieprawidłowe hasło.";

/// Domyślny komunikat dla kodu statusu HTTP.
pub fn for_status(status: u16) -> &'static str {
    match status {
        400 | 422 => BAD_REQUEST,
        401 => UNAUTHORIZED,
        403 => FORBIDDEN,
        404 => NOT_FOUND,
        409 => CONFLICT,
        429 => TOO_MANY_REQUESTS,
        503 => SERVICE_UNAVAILABLE,
        _ => SERVER_ERROR,
    }
}
